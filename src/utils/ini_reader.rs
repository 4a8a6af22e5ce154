//! Ordered INI reader/writer used by the INI-flavoured emitters.
//!
//! The emitters need behaviors plain key-value INI parsers do not offer:
//! repeated unnamed lines inside a section (`{NONAME}` items, one per proxy
//! or rule), sections whose raw lines must be carried through untouched
//! (`store_any_line` / direct-save sections), and stable section ordering on
//! output.

use linked_hash_map::LinkedHashMap;
use std::collections::HashSet;

/// Key under which bare (non `key=value`) lines are stored.
pub const NONAME: &str = "{NONAME}";

#[derive(Debug, thiserror::Error)]
pub enum IniReaderError {
    #[error("Empty document")]
    Empty,
    #[error("Target does not exist")]
    NotExist,
    #[error("Parse error")]
    NotParsed,
}

#[derive(Debug, Default, Clone)]
pub struct IniReader {
    /// Section name -> ordered (key, value) pairs; duplicate keys are kept.
    content: LinkedHashMap<String, Vec<(String, String)>>,
    direct_save_sections: HashSet<String>,
    current_section: String,
    /// Keep any line within a section even if it doesn't follow `key=value`.
    pub store_any_line: bool,
}

impl IniReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a section whose lines are stored and re-emitted verbatim.
    pub fn add_direct_save_section(&mut self, section: &str) {
        self.direct_save_sections.insert(section.to_string());
    }

    pub fn parse(&mut self, content: &str) -> Result<(), IniReaderError> {
        if content.trim().is_empty() {
            return Err(IniReaderError::Empty);
        }

        let mut current = String::new();
        for raw_line in content.lines() {
            let line = raw_line.trim_end_matches('\r');
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                current = trimmed[1..trimmed.len() - 1].to_string();
                self.content.entry(current.clone()).or_insert_with(Vec::new);
                continue;
            }

            if current.is_empty() {
                continue;
            }

            if self.direct_save_sections.contains(&current) {
                self.push_item(&current.clone(), NONAME, line);
                continue;
            }

            if trimmed.starts_with(';') || trimmed.starts_with('#') || trimmed.starts_with("//") {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                self.push_item(&current.clone(), key.trim(), value.trim());
            } else if self.store_any_line {
                self.push_item(&current.clone(), NONAME, trimmed);
            }
        }

        Ok(())
    }

    fn push_item(&mut self, section: &str, key: &str, value: &str) {
        self.content
            .entry(section.to_string())
            .or_insert_with(Vec::new)
            .push((key.to_string(), value.to_string()));
    }

    pub fn section_exist(&self, section: &str) -> bool {
        self.content.contains_key(section)
    }

    pub fn get_section_names(&self) -> Vec<String> {
        self.content.keys().cloned().collect()
    }

    pub fn set_current_section(&mut self, section: &str) {
        self.current_section = section.to_string();
        self.content
            .entry(self.current_section.clone())
            .or_insert_with(Vec::new);
    }

    /// Clear the current section's contents, keeping its position.
    pub fn erase_section(&mut self) {
        let current = self.current_section.clone();
        self.erase_section_by_name(&current);
    }

    pub fn erase_section_by_name(&mut self, section: &str) {
        if let Some(items) = self.content.get_mut(section) {
            items.clear();
        }
    }

    pub fn remove_section(&mut self, section: &str) {
        self.content.remove(section);
        if self.current_section == section {
            self.current_section.clear();
        }
    }

    /// Set a value. `{NONAME}` keys always append; named keys replace the
    /// first occurrence or append when absent.
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let items = self
            .content
            .entry(section.to_string())
            .or_insert_with(Vec::new);
        if key != NONAME {
            if let Some(item) = items.iter_mut().find(|(k, _)| k == key) {
                item.1 = value.to_string();
                return;
            }
        }
        items.push((key.to_string(), value.to_string()));
    }

    pub fn set_current(&mut self, key: &str, value: &str) {
        let current = self.current_section.clone();
        self.set(&current, key, value);
    }

    pub fn get(&self, section: &str, key: &str) -> String {
        self.content
            .get(section)
            .and_then(|items| items.iter().find(|(k, _)| k == key))
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }

    pub fn get_current(&self, key: &str) -> String {
        self.get(&self.current_section, key)
    }

    /// All values stored under `key` in a section, in insertion order.
    pub fn get_all(&self, section: &str, key: &str) -> Vec<String> {
        self.content
            .get(section)
            .map(|items| {
                items
                    .iter()
                    .filter(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All (key, value) pairs of a section, in insertion order.
    pub fn get_items(&self, section: &str) -> Vec<(String, String)> {
        self.content.get(section).cloned().unwrap_or_default()
    }

    /// Serialise back to INI text. Sections appear in insertion order,
    /// `{NONAME}` items as bare lines.
    pub fn to_ini_string(&self) -> String {
        let mut output = String::new();
        for (section, items) in &self.content {
            if items.is_empty() && !self.direct_save_sections.contains(section) {
                continue;
            }
            output.push('[');
            output.push_str(section);
            output.push_str("]\n");
            for (key, value) in items {
                if key == NONAME {
                    output.push_str(value);
                } else {
                    output.push_str(key);
                    output.push_str(" = ");
                    output.push_str(value);
                }
                output.push('\n');
            }
            output.push('\n');
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_values() {
        let mut ini = IniReader::new();
        ini.parse("[General]\nloglevel = notify\ndns-server = system\n")
            .unwrap();
        assert_eq!(ini.get("General", "loglevel"), "notify");
        assert_eq!(ini.get("General", "dns-server"), "system");
    }

    #[test]
    fn test_store_any_line() {
        let mut ini = IniReader::new();
        ini.store_any_line = true;
        ini.parse("[Proxy]\nDIRECT = direct\nsome bare line\n")
            .unwrap();
        assert_eq!(ini.get_all("Proxy", NONAME), vec!["some bare line"]);
    }

    #[test]
    fn test_noname_items_accumulate() {
        let mut ini = IniReader::new();
        ini.set_current_section("Rule");
        ini.set_current(NONAME, "DOMAIN,example.com,Proxy");
        ini.set_current(NONAME, "FINAL,DIRECT");
        assert_eq!(ini.get_all("Rule", NONAME).len(), 2);

        let text = ini.to_ini_string();
        assert!(text.contains("[Rule]\nDOMAIN,example.com,Proxy\nFINAL,DIRECT\n"));
    }

    #[test]
    fn test_named_key_replaces() {
        let mut ini = IniReader::new();
        ini.set("General", "loglevel", "notify");
        ini.set("General", "loglevel", "verbose");
        assert_eq!(ini.get_all("General", "loglevel").len(), 1);
        assert_eq!(ini.get("General", "loglevel"), "verbose");
    }

    #[test]
    fn test_erase_section_keeps_position() {
        let mut ini = IniReader::new();
        ini.store_any_line = true;
        ini.parse("[Proxy]\na = b\n[Rule]\nc = d\n").unwrap();
        ini.set_current_section("Proxy");
        ini.erase_section();
        ini.set_current(NONAME, "DIRECT = direct");
        let names = ini.get_section_names();
        assert_eq!(names, vec!["Proxy", "Rule"]);
        assert_eq!(ini.get_all("Proxy", NONAME), vec!["DIRECT = direct"]);
    }

    #[test]
    fn test_direct_save_section_keeps_lines() {
        let mut ini = IniReader::new();
        ini.add_direct_save_section("MITM");
        ini.parse("[MITM]\n# comment kept\nenable = true\n").unwrap();
        let items = ini.get_all("MITM", NONAME);
        assert_eq!(items, vec!["# comment kept", "enable = true"]);
    }

    #[test]
    fn test_parse_empty_is_error() {
        let mut ini = IniReader::new();
        assert!(ini.parse("   ").is_err());
    }
}
