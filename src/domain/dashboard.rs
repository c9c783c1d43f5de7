// Dashboard widget placement domain model
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub const GRID_ROWS: u32 = 2;
pub const GRID_COLUMNS: u32 = 5;
pub const GRID_CELLS: u32 = GRID_ROWS * GRID_COLUMNS;

/// One configured dashboard widget and the grid cells it covers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetPlacement {
    #[serde(default)]
    pub plugin: String,
    pub widget: String,
    pub url: String,
    #[serde(default)]
    pub options: Map<String, Value>,
    pub boxes: Vec<u32>,
}

impl WidgetPlacement {
    /// Frame source: `url` with the options (minus `url`) as an encoded JSON query param
    pub fn render_url(&self) -> String {
        let mut options = self.options.clone();
        options.remove("url");
        let encoded = urlencoding::encode(&Value::Object(options).to_string()).into_owned();
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}options={}", self.url, separator, encoded)
    }
}

/// Bounding rectangle of a widget, 1-based row/column of its top-left cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSpan {
    pub row: u32,
    pub col: u32,
    pub row_span: u32,
    pub col_span: u32,
}

pub fn cell_column(index: u32) -> u32 {
    (index - 1) % GRID_COLUMNS + 1
}

pub fn cell_row(index: u32) -> u32 {
    index.div_ceil(GRID_COLUMNS)
}

impl GridSpan {
    /// Bounding box of `boxes`. Assumes a rectangle; does not check it.
    pub fn from_boxes(boxes: &[u32]) -> Option<Self> {
        if boxes.is_empty() || boxes.contains(&0) {
            return None;
        }
        let cols = boxes.iter().map(|&i| cell_column(i));
        let rows = boxes.iter().map(|&i| cell_row(i));
        let (min_col, max_col) = (cols.clone().min()?, cols.max()?);
        let (min_row, max_row) = (rows.clone().min()?, rows.max()?);

        Some(Self {
            row: min_row,
            col: min_col,
            row_span: max_row - min_row + 1,
            col_span: max_col - min_col + 1,
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("widget {widget} has no cells")]
    Empty { widget: String },
    #[error("widget {widget} uses cell {index} outside the grid")]
    OutOfRange { widget: String, index: u32 },
    #[error("widget {widget} does not cover a continuous rectangle")]
    NotRectangle { widget: String },
    #[error("widgets {first} and {second} overlap")]
    Overlap { first: String, second: String },
}

pub fn is_continuous_rectangle(boxes: &[u32]) -> bool {
    if boxes.iter().any(|&i| i == 0 || i > GRID_CELLS) {
        return false;
    }
    let Some(span) = GridSpan::from_boxes(boxes) else {
        return false;
    };
    let unique: BTreeSet<u32> = boxes.iter().copied().collect();
    unique.len() == boxes.len() && unique.len() == (span.row_span * span.col_span) as usize
}

pub fn overlaps(a: &[u32], b: &[u32]) -> bool {
    a.iter().any(|cell| b.contains(cell))
}

/// Editor-side acceptance check for a whole dashboard configuration
pub fn validate_layout(widgets: &[WidgetPlacement]) -> Result<(), LayoutError> {
    for widget in widgets {
        if widget.boxes.is_empty() {
            return Err(LayoutError::Empty {
                widget: widget.widget.clone(),
            });
        }
        if let Some(&index) = widget.boxes.iter().find(|&&i| i == 0 || i > GRID_CELLS) {
            return Err(LayoutError::OutOfRange {
                widget: widget.widget.clone(),
                index,
            });
        }
        if !is_continuous_rectangle(&widget.boxes) {
            return Err(LayoutError::NotRectangle {
                widget: widget.widget.clone(),
            });
        }
    }

    for (i, first) in widgets.iter().enumerate() {
        for second in &widgets[i + 1..] {
            if overlaps(&first.boxes, &second.boxes) {
                return Err(LayoutError::Overlap {
                    first: first.widget.clone(),
                    second: second.widget.clone(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn placement(widget: &str, boxes: &[u32]) -> WidgetPlacement {
        WidgetPlacement {
            plugin: "builtin".to_string(),
            widget: widget.to_string(),
            url: "https://widgets.example/gauge.html".to_string(),
            options: Map::new(),
            boxes: boxes.to_vec(),
        }
    }

    #[test]
    fn test_span_for_square_block() {
        let span = GridSpan::from_boxes(&[1, 2, 6, 7]).unwrap();
        assert_eq!((span.row_span, span.col_span), (2, 2));
        assert_eq!((span.row, span.col), (1, 1));
    }

    #[test]
    fn test_span_for_single_cell() {
        let span = GridSpan::from_boxes(&[3]).unwrap();
        assert_eq!((span.row_span, span.col_span), (1, 1));
        assert_eq!((span.row, span.col), (1, 3));
    }

    #[test]
    fn test_bottom_right_block() {
        let span = GridSpan::from_boxes(&[4, 5, 9, 10]).unwrap();
        assert_eq!(
            span,
            GridSpan {
                row: 1,
                col: 4,
                row_span: 2,
                col_span: 2
            }
        );
    }

    #[test]
    fn test_rectangle_predicate() {
        assert!(is_continuous_rectangle(&[4, 5, 9, 10]));
        assert!(is_continuous_rectangle(&[2, 3, 4]));
        assert!(!is_continuous_rectangle(&[1, 3]));
        assert!(!is_continuous_rectangle(&[1, 2, 7]));
        assert!(!is_continuous_rectangle(&[5, 6]));
        assert!(!is_continuous_rectangle(&[1, 1]));
        assert!(!is_continuous_rectangle(&[11]));
    }

    #[test]
    fn test_overlapping_widgets_rejected() {
        let widgets = vec![placement("map", &[4, 5, 9, 10]), placement("speed", &[5])];
        assert_eq!(
            validate_layout(&widgets),
            Err(LayoutError::Overlap {
                first: "map".to_string(),
                second: "speed".to_string()
            })
        );

        let widgets = vec![placement("map", &[4, 5, 9, 10]), placement("speed", &[3, 8])];
        assert!(validate_layout(&widgets).is_ok());
    }

    #[test]
    fn test_render_url_drops_url_option() {
        let mut widget = placement("gauge", &[1]);
        widget.options = json!({"url": "ignored", "api": "Vehicle.Speed"})
            .as_object()
            .unwrap()
            .clone();

        assert_eq!(
            widget.render_url(),
            "https://widgets.example/gauge.html?options=%7B%22api%22%3A%22Vehicle.Speed%22%7D"
        );

        widget.url = "https://widgets.example/gauge.html?theme=dark".to_string();
        assert!(widget.render_url().contains("?theme=dark&options="));
    }
}
