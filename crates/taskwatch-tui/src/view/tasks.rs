use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap};
use ratatui::Frame;

use crate::app::App;
use crate::model::task::BatchPhase;
use crate::view::{spinner_char, truncate};

/// Render the Tasks screen.
pub fn render(f: &mut Frame, app: &App) {
    let area = f.area();

    let chunks = Layout::vertical([
        Constraint::Length(1), // header
        Constraint::Min(5),   // table
        Constraint::Length(1), // footer / stats
    ])
    .split(area);

    render_header(f, chunks[0], app);
    match &app.phase {
        BatchPhase::SubmitFailed(error) => render_error(f, chunks[1], app, error),
        _ => render_table(f, chunks[1], app),
    }
    render_footer(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.theme;
    let phase_text = if app.phase.is_busy() {
        format!("{} {}", spinner_char(app.tick), app.phase.label())
    } else {
        app.phase.label().to_string()
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled(" TASKWATCH ", theme.header_style()),
        Span::styled(
            format!(" {} ", app.base_url),
            Style::default().fg(theme.text).add_modifier(Modifier::BOLD),
        ),
        Span::styled(phase_text, Style::default().fg(theme.phase_color(&app.phase))),
    ]));
    f.render_widget(header, area);
}

fn render_table(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.theme;

    let header_style = Style::default().fg(theme.text).add_modifier(Modifier::BOLD);
    let header = Row::new(
        ["#", "Task", "Status", ""]
            .iter()
            .map(|h| Cell::from(*h).style(header_style)),
    )
    .height(1);

    let rows: Vec<Row> = app
        .rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            let id = truncate(row.task_id.as_str(), (area.width as usize).saturating_sub(34));
            let status_text = if row.status.is_terminal() {
                row.status.to_string()
            } else {
                format!("{} {}", spinner_char(app.tick), row.status)
            };
            let status_style = Style::default()
                .fg(theme.status_color(&row.status))
                .add_modifier(Modifier::BOLD);

            Row::new(vec![
                Cell::from(format!("{}", idx + 1)),
                Cell::from(id),
                Cell::from(status_text).style(status_style),
                Cell::from(row.view_label()).style(Style::default().fg(theme.success)),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(4),
        Constraint::Min(20),
        Constraint::Length(14),
        Constraint::Length(8),
    ];

    let title = if app.file_names.len() == 1 {
        " 1 file ".to_string()
    } else {
        format!(" {} files ", app.file_names.len())
    };

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.border_style())
                .title(title),
        )
        .row_highlight_style(theme.highlight_style());

    let mut state = TableState::default();
    if !app.rows.is_empty() {
        state.select(Some(app.cursor));
    }
    f.render_stateful_widget(table, area, &mut state);
}

fn render_error(f: &mut Frame, area: Rect, app: &App, error: &str) {
    let theme = &app.theme;
    let lines = vec![
        Line::from(Span::styled(
            "  Submission failed",
            Style::default().fg(theme.failed).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(format!("  {error}"), Style::default().fg(theme.text))),
        Line::from(""),
        Line::from(Span::styled(
            "  Press s to submit again.",
            Style::default().fg(theme.dim),
        )),
    ];
    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.border_style()),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, area);
}

fn render_footer(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.theme;
    let total = app.rows.len();
    let done = app.terminal_count();

    let footer = Line::from(vec![
        Span::styled(
            format!(" {}/{} tasks ", done, total),
            Style::default().fg(theme.text),
        ),
        Span::styled(
            " | j/k:nav  Enter:view  r:refresh  s:resubmit  ?:help  q:quit",
            theme.footer_style(),
        ),
    ]);

    f.render_widget(Paragraph::new(footer), area);
}
