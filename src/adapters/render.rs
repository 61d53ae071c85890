use crate::config::RenderSettings;
use crate::domain::model::{PanelEntry, MAX_QUANTITY, MIN_QUANTITY};
use crate::domain::ports::RenderAdapter;
use crate::domain::surface::VisualItem;
use crate::utils::error::{PanelError, Result};
use std::collections::HashSet;

/// Section sign used by the host's text format for color and style codes.
pub const COLOR_CHAR: char = '§';
const COLOR_CODES: &str = "0123456789AaBbCcDdEeFfKkLlMmNnOoRrXx";

/// Renders entries into text visuals with color-escape translation.
///
/// Legacy item encoding (carrying the variant `data` value) is a pure adapter
/// setting; panels and sessions never branch on it.
#[derive(Debug, Clone)]
pub struct TextRenderAdapter {
    color_escape: char,
    legacy_item_encoding: bool,
    known_materials: Option<HashSet<String>>,
}

impl TextRenderAdapter {
    pub fn new(settings: RenderSettings) -> Self {
        Self {
            color_escape: settings.color_escape,
            legacy_item_encoding: settings.legacy_item_encoding,
            known_materials: settings.known_materials.map(|materials| {
                materials
                    .into_iter()
                    .map(|material| material.to_ascii_uppercase())
                    .collect()
            }),
        }
    }

    /// `&a` -> `§a` for every valid code character following the escape.
    pub fn translate_color_codes(&self, text: &str) -> String {
        let mut translated = String::with_capacity(text.len());
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            match chars.peek() {
                Some(&code) if c == self.color_escape && COLOR_CODES.contains(code) => {
                    translated.push(COLOR_CHAR);
                    translated.push(code.to_ascii_lowercase());
                    chars.next();
                }
                _ => translated.push(c),
            }
        }
        translated
    }

    fn check_material(&self, slot: usize, token: &str) -> Result<String> {
        if token.trim().is_empty() {
            return Err(PanelError::RenderError {
                slot,
                message: "empty material token".to_string(),
            });
        }
        let normalized = token.to_ascii_uppercase();
        if let Some(known) = &self.known_materials {
            if !known.contains(&normalized) {
                return Err(PanelError::RenderError {
                    slot,
                    message: format!("unknown material token '{}'", token),
                });
            }
        }
        Ok(normalized)
    }
}

impl Default for TextRenderAdapter {
    fn default() -> Self {
        Self::new(RenderSettings::default())
    }
}

impl RenderAdapter for TextRenderAdapter {
    fn render(&self, entry: &PanelEntry) -> Result<VisualItem> {
        let display = entry.display();
        let kind = self.check_material(entry.slot(), display.material.as_str())?;

        if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&display.quantity) {
            return Err(PanelError::RenderError {
                slot: entry.slot(),
                message: format!(
                    "quantity {} outside {}..={}",
                    display.quantity, MIN_QUANTITY, MAX_QUANTITY
                ),
            });
        }

        let name = if display.name.is_empty() {
            display.material.as_str()
        } else {
            display.name.as_str()
        };

        Ok(VisualItem {
            kind,
            amount: display.quantity,
            display_name: self.translate_color_codes(name),
            lore: display
                .lore
                .iter()
                .map(|line| self.translate_color_codes(line))
                .collect(),
            legacy_data: self.legacy_item_encoding.then_some(display.data),
        })
    }

    fn render_title(&self, title: &str) -> String {
        self.translate_color_codes(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_color_codes() {
        let adapter = TextRenderAdapter::default();
        assert_eq!(adapter.translate_color_codes("&aGreen"), "§aGreen");
        assert_eq!(adapter.translate_color_codes("&LBold&r"), "§lBold§r");
        assert_eq!(adapter.translate_color_codes("Tom & Jerry"), "Tom & Jerry");
        assert_eq!(adapter.translate_color_codes("ends with &"), "ends with &");
        assert_eq!(adapter.translate_color_codes("&&a"), "&§a");
    }

    #[test]
    fn test_custom_escape() {
        let adapter = TextRenderAdapter::new(RenderSettings {
            color_escape: '$',
            ..RenderSettings::default()
        });
        assert_eq!(adapter.translate_color_codes("$cRed &c"), "§cRed &c");
    }

    #[test]
    fn test_render_entry() {
        let adapter = TextRenderAdapter::default();
        let entry = PanelEntry::new("diamond", 4)
            .quantity(3)
            .name("&bShiny")
            .lore(["&7first", "second"]);

        let item = adapter.render(&entry).unwrap();
        assert_eq!(item.kind, "DIAMOND");
        assert_eq!(item.amount, 3);
        assert_eq!(item.display_name, "§bShiny");
        assert_eq!(item.lore, vec!["§7first".to_string(), "second".to_string()]);
        assert_eq!(item.legacy_data, None);
    }

    #[test]
    fn test_render_is_deterministic() {
        let adapter = TextRenderAdapter::default();
        let entry = PanelEntry::new("STONE", 0).name("&eSame");
        assert_eq!(adapter.render(&entry).unwrap(), adapter.render(&entry).unwrap());
    }

    #[test]
    fn test_legacy_encoding_carries_data() {
        let adapter = TextRenderAdapter::new(RenderSettings {
            legacy_item_encoding: true,
            ..RenderSettings::default()
        });
        let item = adapter.render(&PanelEntry::new("WOOL", 0).data(14)).unwrap();
        assert_eq!(item.legacy_data, Some(14));
    }

    #[test]
    fn test_unknown_material_is_render_error() {
        let adapter = TextRenderAdapter::new(RenderSettings {
            known_materials: Some(vec!["stone".to_string()]),
            ..RenderSettings::default()
        });
        assert!(adapter.render(&PanelEntry::new("STONE", 0)).is_ok());

        let err = adapter.render(&PanelEntry::new("BEDROCK", 2)).unwrap_err();
        assert!(matches!(err, PanelError::RenderError { slot: 2, .. }));
    }

    #[test]
    fn test_out_of_range_quantity_is_render_error() {
        let adapter = TextRenderAdapter::default();
        let entry = PanelEntry::new("STONE", 1).quantity(0);
        assert!(matches!(
            adapter.render(&entry),
            Err(PanelError::RenderError { slot: 1, .. })
        ));
    }
}
