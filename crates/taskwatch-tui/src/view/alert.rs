use ratatui::layout::Alignment;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

use crate::theme::Theme;
use crate::view::centered_rect;

/// Render a blocking alert popup.
pub fn render(f: &mut Frame, theme: &Theme, message: &str) {
    let area = f.area();
    let width = (message.chars().count() as u16 + 8).clamp(30, area.width.max(30));
    let popup = centered_rect(width, 6, area);

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            message.to_string(),
            Style::default().fg(theme.text).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled("Enter/Esc: OK", Style::default().fg(theme.dim))),
    ];

    let paragraph = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.alert_border))
                .title(" Alert "),
        )
        .wrap(Wrap { trim: true });

    f.render_widget(Clear, popup);
    f.render_widget(paragraph, popup);
}
