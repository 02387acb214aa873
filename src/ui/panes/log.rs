//! Operation log rendering

use crate::stress::Operation;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Padding, Paragraph},
    Frame,
};
use std::collections::VecDeque;

/// Render the log of recent operations
///
/// A scroll offset of `usize::MAX` pins the view to the newest entry.
pub fn render_log_pane(
    frame: &mut Frame,
    area: Rect,
    log: &VecDeque<(usize, Operation)>,
    is_focused: bool,
    scroll_offset: &mut usize,
) {
    let border_style = if is_focused {
        Style::default()
            .fg(DEFAULT_THEME.border_focused)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.border_normal)
    };

    let block = Block::default()
        .title(" Operations ")
        .borders(Borders::ALL)
        .border_style(border_style);

    if log.is_empty() {
        let paragraph = Paragraph::new("(press → to step)")
            .block(block)
            .style(Style::default().fg(DEFAULT_THEME.comment));
        frame.render_widget(paragraph, area);
        return;
    }

    let block = block.padding(Padding::new(1, 0, 0, 0));
    let all_items: Vec<ListItem> = log
        .iter()
        .map(|(step, op)| {
            let color = if op.failed() {
                DEFAULT_THEME.error
            } else {
                match op {
                    Operation::Defrag { .. } => DEFAULT_THEME.success,
                    Operation::Lock { .. } | Operation::Unlock { .. } => DEFAULT_THEME.locked,
                    Operation::Free { .. } => DEFAULT_THEME.comment,
                    _ => DEFAULT_THEME.fg,
                }
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:>7} ", step),
                    Style::default().fg(DEFAULT_THEME.comment),
                ),
                Span::styled(op.to_string(), Style::default().fg(color)),
            ]))
        })
        .collect();

    let total_items = all_items.len();
    let visible_height = area.height.saturating_sub(2).max(1) as usize;
    if total_items > visible_height {
        *scroll_offset = (*scroll_offset).min(total_items - visible_height);
    } else {
        *scroll_offset = 0;
    }

    let visible_items: Vec<ListItem> = all_items
        .into_iter()
        .skip(*scroll_offset)
        .take(visible_height)
        .collect();

    frame.render_widget(List::new(visible_items).block(block), area);
}
