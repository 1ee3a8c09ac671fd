use crate::parser::ParseError;

/// A `<box>top,left,bottom,right</box>` rectangle in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub top: f64,
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
}

impl BoundingBox {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::InvalidBoundingBox(text.to_string());

        let inner = text
            .trim()
            .strip_prefix("<box>")
            .and_then(|rest| rest.strip_suffix("</box>"))
            .ok_or_else(invalid)?;

        let coords = inner
            .split(',')
            .map(|coord| coord.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;

        match coords.as_slice() {
            [top, left, bottom, right] => Ok(Self {
                top: *top,
                left: *left,
                bottom: *bottom,
                right: *right,
            }),
            _ => Err(invalid()),
        }
    }

    /// Center point as `(x, y)`.
    pub fn center(&self) -> (f64, f64) {
        ((self.left + self.right) / 2.0, (self.top + self.bottom) / 2.0)
    }
}
