use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use taskwatch_core::TaskResult;

use crate::app::App;
use crate::theme::Theme;
use crate::view::truncate;

/// Render the result detail screen.
pub fn render(f: &mut Frame, app: &App, result: &TaskResult) {
    let theme = &app.theme;
    let area = f.area();

    let chunks = Layout::vertical([
        Constraint::Length(1), // breadcrumb
        Constraint::Min(5),   // scrollable content
        Constraint::Length(1), // footer
    ])
    .split(area);

    // --- Breadcrumb ---
    let breadcrumb = Line::from(vec![
        Span::styled(" TASKWATCH ", theme.header_style()),
        Span::styled(" > ", Style::default().fg(theme.dim)),
        Span::styled(
            truncate(result.task_id.as_str(), 40),
            Style::default().fg(theme.text).add_modifier(Modifier::BOLD),
        ),
    ]);
    f.render_widget(Paragraph::new(breadcrumb), chunks[0]);

    // --- Content ---
    let mut lines: Vec<Line> = Vec::new();

    section_header(&mut lines, "RESULT", theme);
    labeled_line(&mut lines, "Task", result.task_id.as_str(), theme);
    labeled_line(&mut lines, "File", &result.file_name, theme);
    labeled_line(&mut lines, "Image", &result.image_url, theme);
    let download = format!("press d to save {}", file_label(&result.file_name));
    labeled_line(&mut lines, "Download", &download, theme);

    lines.push(Line::from(""));
    section_header(&mut lines, "BOUNDING BOXES", theme);
    for text in result.bbox_pretty().lines() {
        lines.push(Line::from(Span::styled(
            format!("  {text}"),
            Style::default().fg(theme.text),
        )));
    }

    let content = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.border_style()),
        )
        .wrap(Wrap { trim: false })
        .scroll((app.detail_scroll, 0));

    f.render_widget(content, chunks[1]);

    // --- Footer ---
    render_footer(f, chunks[2], app);
}

fn file_label(file_name: &str) -> &str {
    file_name.rsplit('/').next().unwrap_or(file_name)
}

fn section_header<'a>(lines: &mut Vec<Line<'a>>, title: &'a str, theme: &Theme) {
    lines.push(Line::from(Span::styled(
        format!("  {title}"),
        Style::default()
            .fg(theme.active)
            .add_modifier(Modifier::BOLD),
    )));
}

fn labeled_line<'a>(lines: &mut Vec<Line<'a>>, label: &'a str, value: &str, theme: &Theme) {
    lines.push(Line::from(vec![
        Span::styled(
            format!("  {label:<16}"),
            Style::default().fg(theme.dim),
        ),
        Span::styled(value.to_string(), Style::default().fg(theme.text)),
    ]));
}

fn render_footer(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.theme;
    let mut spans = vec![Span::styled(
        " j/k:scroll  d:download  Esc:back  ?:help  q:quit",
        theme.footer_style(),
    )];
    if let Some(notice) = &app.notice {
        spans.push(Span::styled(
            format!("  {notice}"),
            Style::default().fg(theme.active),
        ));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}
