//! Text rendering utilities for human-friendly error messages and
//! event log lines.
//!
//! Provides helpers to format type names, registration updates and
//! module resolution orders in error output.

use std::fmt;

/// Shortens a fully qualified type name for display.
///
/// ```
/// use tazriq_support::rendering::shorten_type_name;
///
/// let short = shorten_type_name("my_app::services::user::UserService");
/// assert_eq!(short, "UserService");
///
/// let short = shorten_type_name("alloc::sync::Arc<dyn my_app::traits::Logger>");
/// assert_eq!(short, "Arc<dyn Logger>");
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    // Drop the path prefix of every segment, keeping generics structure:
    // "my_app::services::UserService" → "UserService"
    // "Arc<dyn my_app::Logger>" → "Arc<dyn Logger>"
    let mut result = String::with_capacity(full_name.len());
    let mut segment = String::new();
    let mut chars = full_name.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                segment.clear();
            }
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' => {
                result.push_str(&segment);
                result.push(ch);
                segment.clear();
            }
            _ => segment.push(ch),
        }
    }

    result.push_str(&segment);
    result
}

/// Renders a list of type names as backtick-quoted, comma-separated text.
///
/// Used by registration-update log lines:
///
/// ```
/// use tazriq_support::rendering::render_type_list;
///
/// let rendered = render_type_list(&["core::Database", "dyn core::Storage"]);
/// assert_eq!(rendered, "`Database`, `dyn Storage`");
/// ```
pub fn render_type_list(names: &[impl AsRef<str>]) -> String {
    names
        .iter()
        .map(|name| format!("`{}`", shorten_type_name(name.as_ref())))
        .collect::<Vec<_>>()
        .join(", ")
}

/// An entry in a module resolution order for vertical rendering.
#[derive(Debug)]
pub struct ResolutionEntry {
    /// Module (or locator) name
    pub name: String,
    /// Priority band annotation, e.g. "high" or "low"
    pub band: Option<String>,
}

impl fmt::Display for ResolutionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.band {
            Some(band) => write!(f, "[{band}] {}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Renders a module's broker search order, one entry per line.
///
/// ```text
/// [high] overrides
/// [low]  defaults
/// <own locator>
/// ```
pub fn render_resolution_order(entries: &[ResolutionEntry]) -> String {
    let width = entries
        .iter()
        .filter_map(|entry| entry.band.as_ref().map(|band| band.len()))
        .max()
        .unwrap_or(0);

    entries
        .iter()
        .map(|entry| match &entry.band {
            Some(band) => format!("[{band:<width$}] {}", entry.name),
            None => entry.name.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Finds registered type names similar to a requested one, for
/// "did you mean?" suggestions in lookup errors.
pub fn suggest_similar(
    requested: &str,
    available: &[&str],
    max_suggestions: usize,
) -> Vec<String> {
    let requested_short = shorten_type_name(requested).to_lowercase();

    let mut scored: Vec<(&str, usize)> = available
        .iter()
        .filter_map(|&name| {
            let name_short = shorten_type_name(name).to_lowercase();

            if name_short == requested_short {
                return Some((name, 100));
            }

            if name_short.contains(&requested_short)
                || requested_short.contains(&name_short)
            {
                return Some((name, 80));
            }

            let common = name_short
                .chars()
                .zip(requested_short.chars())
                .take_while(|(a, b)| a == b)
                .count();

            (common >= 3).then_some((name, common * 10))
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored
        .into_iter()
        .take(max_suggestions)
        .map(|(name, _)| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorten_simple_path() {
        assert_eq!(
            shorten_type_name("my_app::services::UserService"),
            "UserService"
        );
    }

    #[test]
    fn shorten_with_generics() {
        assert_eq!(
            shorten_type_name("alloc::sync::Arc<dyn my_app::traits::Logger>"),
            "Arc<dyn Logger>"
        );
    }

    #[test]
    fn shorten_no_path() {
        assert_eq!(shorten_type_name("String"), "String");
    }

    #[test]
    fn render_list_of_types() {
        assert_eq!(
            render_type_list(&["a::b::C", "d::E"]),
            "`C`, `E`"
        );
    }

    #[test]
    fn render_empty_list() {
        let names: Vec<&str> = vec![];
        assert_eq!(render_type_list(&names), "");
    }

    #[test]
    fn resolution_order_rendering() {
        let entries = vec![
            ResolutionEntry {
                name: "overrides".to_string(),
                band: Some("high".to_string()),
            },
            ResolutionEntry {
                name: "defaults".to_string(),
                band: Some("low".to_string()),
            },
            ResolutionEntry {
                name: "<own locator>".to_string(),
                band: None,
            },
        ];

        let rendered = render_resolution_order(&entries);
        assert!(rendered.contains("[high] overrides"));
        assert!(rendered.contains("defaults"));
        assert!(rendered.ends_with("<own locator>"));
    }

    #[test]
    fn suggest_similar_types() {
        let available = vec![
            "my_app::UserService",
            "my_app::UserRepository",
            "my_app::Logger",
            "my_app::Database",
        ];

        let suggestions = suggest_similar("UserServ", &available, 3);
        assert!(!suggestions.is_empty());
        assert!(suggestions[0].contains("UserService"));
    }

    #[test]
    fn suggest_no_match() {
        let available = vec!["my_app::Database"];
        let suggestions = suggest_similar("XyzAbcDef", &available, 3);
        assert!(suggestions.is_empty());
    }
}
