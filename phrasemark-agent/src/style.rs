//! The slice of computed style the visibility check needs, parsed from an
//! element's inline `style` attribute.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Display {
    #[default]
    Normal,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Style {
    pub display: Display,
    pub visibility: Option<Visibility>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub max_height: Option<f32>,
    pub overflow_hidden: bool,
}

impl Style {
    pub fn parse(css: &str) -> Self {
        let mut style = Self::default();
        for declaration in css.split(';') {
            let Some((property, value)) = declaration.split_once(':') else {
                continue;
            };
            let property = property.trim().to_ascii_lowercase();
            let value = value
                .trim()
                .trim_end_matches("!important")
                .trim()
                .to_ascii_lowercase();
            match property.as_str() {
                "display" => {
                    style.display = if value == "none" {
                        Display::None
                    } else {
                        Display::Normal
                    };
                }
                "visibility" => {
                    style.visibility = match value.as_str() {
                        "hidden" | "collapse" => Some(Visibility::Hidden),
                        "visible" => Some(Visibility::Visible),
                        _ => None,
                    };
                }
                "width" => style.width = parse_length(&value),
                "height" => style.height = parse_length(&value),
                "max-height" => style.max_height = parse_length(&value),
                "overflow" | "overflow-y" => {
                    style.overflow_hidden = matches!(value.as_str(), "hidden" | "clip");
                }
                _ => {}
            }
        }
        style
    }

    /// Zero-height (or zero-width) box that clips its content.
    pub fn is_collapsed(&self) -> bool {
        let zero = |length: Option<f32>| length.is_some_and(|v| v <= 0.0);
        self.overflow_hidden && (zero(self.height) || zero(self.max_height) || zero(self.width))
    }

    pub fn explicit_size(&self) -> Option<(f32, f32)> {
        Some((self.width?, self.height?))
    }
}

/// Leading number of a CSS length; units are ignored.
fn parse_length(value: &str) -> Option<f32> {
    let end = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(value.len());
    value[..end].parse().ok()
}
