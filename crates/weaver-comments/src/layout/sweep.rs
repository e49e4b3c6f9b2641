//! Two-pass bubble placement around a pivot.
//!
//! The pivot is the focused bubble, or the first one when nothing is focused.
//! The ascending pass walks down from the pivot pushing bubbles below their
//! predecessor; the descending pass walks up from the pivot pushing bubbles
//! above their successor. Either way, consecutive bubbles end up at least
//! `spacing` apart.

use super::{LayoutConfig, Viewport};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SweepItem {
    pub anchor_top: f64,
    pub height: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub top: f64,
    pub inset: f64,
}

/// Place `items` (document order). `focus` out of range counts as no focus.
pub fn sweep(
    items: &[SweepItem],
    focus: Option<usize>,
    viewport: &Viewport,
    config: &LayoutConfig,
) -> Vec<Placement> {
    if items.is_empty() {
        return Vec::new();
    }
    let focus = focus.filter(|&i| i < items.len());
    let active = focus.is_some();
    let pivot = focus.unwrap_or(0);

    let desired = |item: &SweepItem| item.anchor_top - config.top_offset + viewport.scroll_offset;

    let mut placements = vec![
        Placement {
            top: 0.0,
            inset: config.base_inset,
        };
        items.len()
    ];

    let mut top_border = viewport.editor_top - config.top_offset - config.spacing;
    for (i, item) in items.iter().enumerate().skip(pivot) {
        let mut want = desired(item);
        if active && i == pivot {
            // Keep the focused bubble and its composer on screen.
            let limit = viewport.scroll_offset + viewport.height
                - config.spacing
                - config.reserved_footer
                - item.height;
            want = want.min(limit);
            placements[i].inset = config.focused_inset;
        }
        let top = if want >= top_border { want } else { top_border };
        placements[i].top = top;
        top_border = top + item.height + config.spacing;
    }

    let mut bottom_border = placements[pivot].top;
    for i in (0..pivot).rev() {
        let item = &items[i];
        let want = desired(item);
        let top = if want + item.height + config.spacing > bottom_border {
            bottom_border - item.height - config.spacing
        } else {
            want
        };
        placements[i].top = top;
        bottom_border = top;
    }

    placements
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(anchor_top: f64, height: f64) -> SweepItem {
        SweepItem { anchor_top, height }
    }

    fn viewport() -> Viewport {
        Viewport {
            editor_top: 0.0,
            scroll_offset: 0.0,
            height: 2000.0,
            width: 1440.0,
        }
    }

    fn assert_no_overlap(items: &[SweepItem], placements: &[Placement], spacing: f64) {
        for i in 1..items.len() {
            let prev_bottom = placements[i - 1].top + items[i - 1].height;
            assert!(
                placements[i].top - prev_bottom >= spacing - 1e-9,
                "bubbles {} and {} overlap: {:?}",
                i - 1,
                i,
                placements
            );
        }
    }

    #[test]
    fn test_same_line_pair_stacks_below_focus() {
        let config = LayoutConfig::default();
        let items = [item(500.0, 40.0), item(500.0, 60.0)];
        let placed = sweep(&items, Some(0), &viewport(), &config);
        assert_eq!(placed[0].top, 492.0);
        assert_eq!(placed[1].top, placed[0].top + 40.0 + config.spacing);
        assert_eq!(placed[0].inset, config.focused_inset);
        assert_eq!(placed[1].inset, config.base_inset);
    }

    #[test]
    fn test_descending_pass_pushes_up() {
        let config = LayoutConfig::default();
        let items = [item(300.0, 100.0), item(310.0, 50.0), item(320.0, 50.0)];
        let placed = sweep(&items, Some(2), &viewport(), &config);
        assert_eq!(placed[2].top, 312.0);
        // Bubble 1 ends `spacing` above the pivot.
        assert_eq!(placed[1].top, 312.0 - 50.0 - 10.0);
        assert_eq!(placed[0].top, placed[1].top - 100.0 - 10.0);
        assert_no_overlap(&items, &placed, config.spacing);
    }

    #[test]
    fn test_unfocused_uses_first_as_pivot_without_clamp() {
        let config = LayoutConfig::default();
        let vp = Viewport {
            height: 300.0,
            ..viewport()
        };
        let items = [item(1000.0, 80.0)];
        let placed = sweep(&items, None, &vp, &config);
        assert_eq!(placed[0].top, 992.0);
        assert_eq!(placed[0].inset, config.base_inset);

        // Focused, the same bubble is pulled back into the viewport.
        let placed = sweep(&items, Some(0), &vp, &config);
        assert_eq!(placed[0].top, 300.0 - 10.0 - 64.0 - 80.0);
    }

    #[test]
    fn test_top_border_floor() {
        let config = LayoutConfig::default();
        let vp = Viewport {
            editor_top: 200.0,
            ..viewport()
        };
        let placed = sweep(&[item(0.0, 20.0)], None, &vp, &config);
        assert_eq!(placed[0].top, 200.0 - 8.0 - 10.0);
    }

    #[test]
    fn test_out_of_range_focus_ignored() {
        let config = LayoutConfig::default();
        let items = [item(10.0, 10.0)];
        let placed = sweep(&items, Some(5), &viewport(), &config);
        assert_eq!(placed[0].inset, config.base_inset);
    }

    #[test]
    fn test_non_overlap_for_every_focus() {
        let config = LayoutConfig::default();
        let items = [
            item(40.0, 120.0),
            item(45.0, 30.0),
            item(45.0, 75.0),
            item(200.0, 10.0),
            item(210.0, 300.0),
            item(900.0, 55.0),
            item(905.0, 55.0),
            item(1800.0, 400.0),
        ];
        for vp in [
            viewport(),
            Viewport {
                scroll_offset: 700.0,
                height: 500.0,
                ..viewport()
            },
        ] {
            assert_no_overlap(&items, &sweep(&items, None, &vp, &config), config.spacing);
            for focus in 0..items.len() {
                let placed = sweep(&items, Some(focus), &vp, &config);
                assert_no_overlap(&items, &placed, config.spacing);
            }
        }
    }
}
