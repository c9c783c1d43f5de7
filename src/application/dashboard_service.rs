// Dashboard service - Use case for laying out the widget grid
use crate::domain::dashboard::{GridSpan, WidgetPlacement, GRID_CELLS};
use serde::Serialize;
use std::collections::BTreeSet;

/// One rendered slot of the 2x5 grid
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GridCell {
    Widget {
        index: u32,
        span: GridSpan,
        widget: String,
        plugin: String,
        src: String,
    },
    Placeholder {
        index: u32,
    },
}

#[derive(Clone)]
pub struct DashboardService {
    widgets: Vec<WidgetPlacement>,
}

impl DashboardService {
    pub fn new(widgets: Vec<WidgetPlacement>) -> Self {
        Self { widgets }
    }

    /// Cells in row-major order. A widget is emitted at its lowest box; the
    /// other boxes it covers produce nothing.
    pub fn layout(&self) -> Vec<GridCell> {
        let mut covered = BTreeSet::new();
        let mut anchored = Vec::new();

        for widget in &self.widgets {
            let Some(span) = GridSpan::from_boxes(&widget.boxes) else {
                tracing::warn!("Skipping widget {} without usable boxes", widget.widget);
                continue;
            };
            let Some(&anchor) = widget.boxes.iter().min() else {
                continue;
            };
            covered.extend(widget.boxes.iter().copied());
            anchored.push((anchor, span, widget));
        }

        let mut cells = Vec::new();
        for index in 1..=GRID_CELLS {
            if let Some((_, span, widget)) = anchored.iter().find(|(anchor, _, _)| *anchor == index) {
                cells.push(GridCell::Widget {
                    index,
                    span: *span,
                    widget: widget.widget.clone(),
                    plugin: widget.plugin.clone(),
                    src: widget.render_url(),
                });
            } else if !covered.contains(&index) {
                cells.push(GridCell::Placeholder { index });
            }
        }

        cells
    }
}
