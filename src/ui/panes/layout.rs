//! Heap map rendering
//!
//! Draws the whole address space of the test heap as a grid of cells. Each
//! cell stands for an equal share of the bytes and takes the colour of the
//! most constrained allocation touching it: locked, then fixed, then movable.

use crate::stress::TestHeap;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum CellState {
    Free,
    Movable,
    Fixed,
    Locked,
}

impl CellState {
    fn glyph(self) -> &'static str {
        match self {
            CellState::Free => "·",
            _ => "█",
        }
    }

    fn style(self) -> Style {
        let color = match self {
            CellState::Free => DEFAULT_THEME.free,
            CellState::Movable => DEFAULT_THEME.movable,
            CellState::Fixed => DEFAULT_THEME.fixed,
            CellState::Locked => DEFAULT_THEME.locked,
        };
        Style::default().fg(color)
    }
}

/// Bucket the heap into `cells` cells
fn cell_map(heap: &TestHeap, cells: usize) -> (Vec<CellState>, usize) {
    let space = heap.address_space_size().max(1);
    let bytes_per_cell = space.div_ceil(cells.max(1)).max(1);
    let mut map = vec![CellState::Free; space.div_ceil(bytes_per_cell)];

    for (_, range) in heap.allocator().allocations() {
        let state = if range.is_locked() {
            CellState::Locked
        } else if range.movable() {
            CellState::Movable
        } else {
            CellState::Fixed
        };
        let first = range.position() / bytes_per_cell;
        let last = (range.end() - 1) / bytes_per_cell;
        for cell in &mut map[first..=last] {
            *cell = (*cell).max(state);
        }
    }
    (map, bytes_per_cell)
}

/// Render the heap map pane
pub fn render_layout_pane(frame: &mut Frame, area: Rect, heap: &TestHeap, is_focused: bool) {
    let border_style = if is_focused {
        Style::default()
            .fg(DEFAULT_THEME.border_focused)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.border_normal)
    };

    let width = area.width.saturating_sub(2).max(1) as usize;
    // Leave one row for the legend
    let height = area.height.saturating_sub(3).max(1) as usize;
    let (map, bytes_per_cell) = cell_map(heap, width * height);

    let block = Block::default()
        .title(format!(
            " Heap Map ({} bytes, {} B/cell) ",
            heap.address_space_size(),
            bytes_per_cell
        ))
        .borders(Borders::ALL)
        .border_style(border_style);

    let mut lines: Vec<Line> = map
        .chunks(width)
        .map(|row| {
            Line::from(
                row.iter()
                    .map(|state| Span::styled(state.glyph(), state.style()))
                    .collect::<Vec<_>>(),
            )
        })
        .collect();

    let legend = [
        (CellState::Movable, " movable "),
        (CellState::Fixed, " fixed "),
        (CellState::Locked, " locked "),
        (CellState::Free, " free "),
    ];
    let mut legend_spans = Vec::new();
    for (state, label) in legend {
        legend_spans.push(Span::styled(state.glyph(), state.style()));
        legend_spans.push(Span::styled(label, Style::default().fg(DEFAULT_THEME.comment)));
    }
    lines.truncate(height);
    lines.push(Line::from(legend_spans));

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_map_prefers_locked() {
        let mut heap = TestHeap::new(100);
        let a = heap.alloc(10, true, true).unwrap();
        heap.alloc(10, false, true).unwrap();
        heap.lock(a);

        let (map, bytes_per_cell) = cell_map(&heap, 10);
        assert_eq!(bytes_per_cell, 10);
        assert_eq!(map[0], CellState::Locked);
        assert_eq!(map[1], CellState::Fixed);
        assert_eq!(map[2], CellState::Free);
    }

    #[test]
    fn test_cell_map_merges_shared_cell() {
        let mut heap = TestHeap::new(40);
        heap.alloc(5, true, true).unwrap();
        heap.alloc(5, false, true).unwrap();

        let (map, _) = cell_map(&heap, 4);
        assert_eq!(map.len(), 4);
        assert_eq!(map[0], CellState::Fixed);
    }
}
