//! Layout engine: pure placement functions.
//!
//! A layout maps a monitor's tiled clients and region to a list of resize
//! commands. Nothing here touches the display server, so every layout can be
//! tested in isolation and is idempotent by construction.

use serde::{Deserialize, Serialize};
use x11rb::protocol::xproto::Window;

use crate::types::Rect;

/// The closed set of layouts a monitor can select by index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Master column on the left, stack column on the right
    Tile,
    /// Selected client covers the whole region
    Monocle,
}

impl Layout {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "tile" | "tiled" => Some(Layout::Tile),
            "monocle" => Some(Layout::Monocle),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Layout::Tile => "tile",
            Layout::Monocle => "monocle",
        }
    }

    /// Short status-bar style symbol
    pub fn symbol(self) -> &'static str {
        match self {
            Layout::Tile => "[]=",
            Layout::Monocle => "[M]",
        }
    }

    /// Compute placements for `windows` (stacking order, master slot first).
    ///
    /// `selected` is only consulted by Monocle; when it is not among
    /// `windows` the master slot is used instead.
    pub fn arrange(
        self,
        region: Rect,
        windows: &[Window],
        selected: Option<Window>,
        master_count: usize,
        border_width: u32,
    ) -> Vec<ResizeCommand> {
        match self {
            Layout::Tile => tile(region, windows, master_count, border_width),
            Layout::Monocle => monocle(region, windows, selected),
        }
    }
}

/// One placement produced by a layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeCommand {
    pub window: Window,
    /// Outer cell including the border
    pub cell: Rect,
    pub border_width: u32,
}

impl ResizeCommand {
    /// Inner geometry to send with the configure request
    pub fn geometry(&self) -> Rect {
        self.cell.inset(self.border_width)
    }
}

/// Split `total` into `count` consecutive spans that add up to `total` exactly.
/// Each span gets the remaining length divided by the remaining count, so any
/// rounding slack lands on the last spans.
fn split_span(start: i32, total: u32, count: usize) -> Vec<(i32, u32)> {
    let mut spans = Vec::with_capacity(count);
    let mut offset = 0u32;
    for i in 0..count {
        let remaining = (count - i) as u32;
        let len = (total - offset) / remaining;
        spans.push((start + offset as i32, len));
        offset += len;
    }
    spans
}

fn tile(region: Rect, windows: &[Window], master_count: usize, border: u32) -> Vec<ResizeCommand> {
    let n = windows.len();
    if n == 0 {
        return Vec::new();
    }
    let masters = master_count.min(n);
    let stacked = n - masters;

    let master_width = if stacked == 0 {
        region.width
    } else if masters == 0 {
        0
    } else {
        region.width / 2
    };
    let stack_width = region.width - master_width;

    let mut commands = Vec::with_capacity(n);
    let master_rows = split_span(region.y, region.height, masters);
    for (&window, (y, height)) in windows[..masters].iter().zip(master_rows) {
        commands.push(ResizeCommand {
            window,
            cell: Rect::new(region.x, y, master_width, height),
            border_width: border,
        });
    }

    let stack_x = region.x + master_width as i32;
    let stack_rows = split_span(region.y, region.height, stacked);
    for (&window, (y, height)) in windows[masters..].iter().zip(stack_rows) {
        commands.push(ResizeCommand {
            window,
            cell: Rect::new(stack_x, y, stack_width, height),
            border_width: border,
        });
    }
    commands
}

fn monocle(region: Rect, windows: &[Window], selected: Option<Window>) -> Vec<ResizeCommand> {
    let target = selected
        .filter(|w| windows.contains(w))
        .or_else(|| windows.first().copied());
    target
        .map(|window| ResizeCommand {
            window,
            cell: region,
            border_width: 0,
        })
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCREEN: Rect = Rect {
        x: 0,
        y: 0,
        width: 1920,
        height: 1080,
    };

    fn cells(commands: &[ResizeCommand]) -> Vec<(Window, Rect)> {
        commands.iter().map(|c| (c.window, c.cell)).collect()
    }

    #[test]
    fn test_layout_names() {
        assert_eq!(Layout::from_name("tile"), Some(Layout::Tile));
        assert_eq!(Layout::from_name("Monocle"), Some(Layout::Monocle));
        assert_eq!(Layout::from_name("spiral"), None);
        assert_eq!(Layout::Tile.name(), "tile");
        assert_eq!(Layout::Monocle.symbol(), "[M]");
    }

    #[test]
    fn test_tile_three_clients_scenario() {
        // Inserted A, B, C at head: stacking order is [C, B, A]
        let (a, b, c) = (0xa, 0xb, 0xc);
        let commands = Layout::Tile.arrange(SCREEN, &[c, b, a], None, 1, 2);

        assert_eq!(
            cells(&commands),
            vec![
                (c, Rect::new(0, 0, 960, 1080)),
                (b, Rect::new(960, 0, 960, 540)),
                (a, Rect::new(960, 540, 960, 540)),
            ]
        );
        assert_eq!(commands[0].geometry(), Rect::new(0, 0, 956, 1076));
        assert_eq!(commands[2].geometry(), Rect::new(960, 540, 956, 536));
    }

    #[test]
    fn test_tile_single_client_spans_full_width() {
        let commands = Layout::Tile.arrange(SCREEN, &[1], None, 1, 2);
        assert_eq!(cells(&commands), vec![(1, SCREEN)]);
        assert_eq!(commands[0].border_width, 2);
    }

    #[test]
    fn test_tile_master_count_zero_uses_stack_only() {
        let commands = Layout::Tile.arrange(SCREEN, &[1, 2], None, 0, 0);
        assert_eq!(
            cells(&commands),
            vec![
                (1, Rect::new(0, 0, 1920, 540)),
                (2, Rect::new(0, 540, 1920, 540)),
            ]
        );
    }

    #[test]
    fn test_tile_master_count_exceeding_clients() {
        let commands = Layout::Tile.arrange(SCREEN, &[1, 2], None, 3, 0);
        assert_eq!(
            cells(&commands),
            vec![
                (1, Rect::new(0, 0, 1920, 540)),
                (2, Rect::new(0, 540, 1920, 540)),
            ]
        );
    }

    #[test]
    fn test_tile_is_idempotent() {
        let windows = [5, 4, 3, 2, 1];
        let first = Layout::Tile.arrange(SCREEN, &windows, None, 2, 1);
        let second = Layout::Tile.arrange(SCREEN, &windows, None, 2, 1);
        assert_eq!(first, second);
    }

    #[test]
    fn test_tile_covers_region_exactly() {
        let region = Rect::new(1920, 0, 1281, 1023);
        for n in 1..8usize {
            for master_count in 0..4usize {
                let windows: Vec<Window> = (1..=n as u32).collect();
                let commands = Layout::Tile.arrange(region, &windows, None, master_count, 2);
                assert_eq!(commands.len(), n);

                let masters = master_count.min(n);
                let (master, stack) = commands.split_at(masters);
                for column in [master, stack] {
                    if column.is_empty() {
                        continue;
                    }
                    let height: u32 = column.iter().map(|c| c.cell.height).sum();
                    assert_eq!(height, region.height, "n={} masters={}", n, master_count);
                    assert_eq!(column[0].cell.y, region.y);
                }
                match (master.first(), stack.first()) {
                    (Some(m), Some(s)) => {
                        assert_eq!(m.cell.width + s.cell.width, region.width);
                        assert_eq!(s.cell.x, region.x + m.cell.width as i32);
                    }
                    (Some(m), None) => assert_eq!(m.cell.width, region.width),
                    (None, Some(s)) => assert_eq!(s.cell.width, region.width),
                    (None, None) => unreachable!(),
                }
            }
        }
    }

    #[test]
    fn test_tile_empty() {
        assert!(Layout::Tile.arrange(SCREEN, &[], None, 1, 2).is_empty());
    }

    #[test]
    fn test_monocle_places_selected_without_border() {
        let commands = Layout::Monocle.arrange(SCREEN, &[1, 2, 3], Some(2), 1, 2);
        assert_eq!(
            commands,
            vec![ResizeCommand {
                window: 2,
                cell: SCREEN,
                border_width: 0,
            }]
        );
        assert_eq!(commands[0].geometry(), SCREEN);
    }

    #[test]
    fn test_monocle_falls_back_to_master() {
        let commands = Layout::Monocle.arrange(SCREEN, &[7, 8], Some(99), 1, 2);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].window, 7);
        assert!(Layout::Monocle.arrange(SCREEN, &[], None, 1, 2).is_empty());
    }
}
