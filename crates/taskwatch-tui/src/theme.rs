use ratatui::style::{Color, Modifier, Style};

use crate::model::task::BatchPhase;
use taskwatch_core::TaskStatus;

/// Color theme for the TUI.
pub struct Theme {
    pub success: Color,
    pub failed: Color,
    pub pending: Color,
    pub other: Color,

    pub header_fg: Color,
    pub header_bg: Color,
    pub border: Color,
    pub text: Color,
    pub dim: Color,
    pub highlight_bg: Color,
    pub active: Color,
    pub alert_border: Color,
    pub footer_fg: Color,
    pub footer_bg: Color,
}

impl Theme {
    /// Hacker-green terminal theme.
    pub fn hacker() -> Self {
        Self {
            success: Color::Green,
            failed: Color::Red,
            pending: Color::Cyan,
            other: Color::Yellow,

            header_fg: Color::Black,
            header_bg: Color::Green,
            border: Color::DarkGray,
            text: Color::White,
            dim: Color::DarkGray,
            highlight_bg: Color::Rgb(30, 50, 30),
            active: Color::Cyan,
            alert_border: Color::Red,
            footer_fg: Color::DarkGray,
            footer_bg: Color::Reset,
        }
    }

    pub fn status_color(&self, status: &TaskStatus) -> Color {
        match status {
            TaskStatus::Success => self.success,
            TaskStatus::Failed => self.failed,
            TaskStatus::Pending => self.pending,
            TaskStatus::Other(_) => self.other,
        }
    }

    pub fn phase_color(&self, phase: &BatchPhase) -> Color {
        match phase {
            BatchPhase::Idle => self.dim,
            BatchPhase::Submitting | BatchPhase::Polling => self.active,
            BatchPhase::Complete => self.success,
            BatchPhase::SubmitFailed(_) => self.failed,
        }
    }

    pub fn header_style(&self) -> Style {
        Style::default().fg(self.header_fg).bg(self.header_bg).add_modifier(Modifier::BOLD)
    }

    pub fn highlight_style(&self) -> Style {
        Style::default().bg(self.highlight_bg).add_modifier(Modifier::BOLD)
    }

    pub fn border_style(&self) -> Style {
        Style::default().fg(self.border)
    }

    pub fn footer_style(&self) -> Style {
        Style::default().fg(self.footer_fg).bg(self.footer_bg)
    }
}
