//! Allocation list rendering

use crate::stress::TestHeap;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem},
    Frame,
};

/// Render the allocation list, in address order
pub fn render_allocations_pane(
    frame: &mut Frame,
    area: Rect,
    heap: &TestHeap,
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
        .title(format!(" Allocations ({}) ", heap.allocation_count()))
        .borders(Borders::ALL)
        .border_style(border_style);

    let all_items: Vec<ListItem> = heap
        .allocator()
        .allocations()
        .map(|(_, range)| {
            let (kind, color) = if range.is_locked() {
                ("locked", DEFAULT_THEME.locked)
            } else if range.movable() {
                ("movable", DEFAULT_THEME.movable)
            } else {
                ("fixed", DEFAULT_THEME.fixed)
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:>6}", range.position()),
                    Style::default().fg(DEFAULT_THEME.comment),
                ),
                Span::raw(" | "),
                Span::styled(
                    format!("#{:<6}", range.owner()),
                    Style::default().fg(DEFAULT_THEME.fg),
                ),
                Span::styled(
                    format!("{:>4} bytes ", range.size()),
                    Style::default().fg(DEFAULT_THEME.primary),
                ),
                Span::styled(kind, Style::default().fg(color)),
            ]))
        })
        .collect();

    if all_items.is_empty() {
        let list = List::new(vec![ListItem::new("(no allocations)")
            .style(Style::default().fg(DEFAULT_THEME.comment))])
        .block(block);
        frame.render_widget(list, area);
        return;
    }

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
