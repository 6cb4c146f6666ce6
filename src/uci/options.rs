//! Engine options exposed over UCI.

/// Process-wide configuration, owned by the UCI layer and passed
/// explicitly where needed instead of living in globals.
#[derive(Clone, Copy, Debug)]
pub struct EngineOptions {
    pub hash_mb: usize,
    pub threads: usize,
    pub chess960: bool,
    pub show_wdl: bool,
    pub move_overhead_ms: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            hash_mb: 64,
            threads: 1,
            chess960: false,
            show_wdl: true,
            move_overhead_ms: 10,
        }
    }
}

impl EngineOptions {
    /// Print the `option` lines for `uci`
    pub fn print_all(&self) {
        print_spin("Hash", self.hash_mb, 1, 65536);
        print_spin("Threads", self.threads, 1, 256);
        print_check("UCI_Chess960", self.chess960);
        print_check("UCI_ShowWDL", self.show_wdl);
        print_spin("MoveOverhead", self.move_overhead_ms, 0, 1000);
    }
}

fn print_spin(
    name: &str,
    default: impl std::fmt::Display,
    min: impl std::fmt::Display,
    max: impl std::fmt::Display,
) {
    println!("option name {name} type spin default {default} min {min} max {max}");
}

fn print_check(name: &str, default: bool) {
    println!(
        "option name {name} type check default {}",
        if default { "true" } else { "false" }
    );
}

/// Split a `setoption` tail into its name and optional value
#[must_use]
pub fn parse_setoption(tokens: &[&str]) -> Option<(String, Option<String>)> {
    let mut name_parts: Vec<&str> = Vec::new();
    let mut value_parts: Vec<&str> = Vec::new();
    let mut mode = "";

    for token in tokens {
        match *token {
            "name" => mode = "name",
            "value" => mode = "value",
            _ => match mode {
                "name" => name_parts.push(token),
                "value" => value_parts.push(token),
                _ => {}
            },
        }
    }

    if name_parts.is_empty() {
        return None;
    }
    let value = if value_parts.is_empty() {
        None
    } else {
        Some(value_parts.join(" "))
    };
    Some((name_parts.join(" "), value))
}

/// Parse a UCI boolean value
#[must_use]
pub fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_setoption_name_and_value() {
        let tokens = ["name", "Hash", "value", "128"];
        let (name, value) = parse_setoption(&tokens).unwrap();
        assert_eq!(name, "Hash");
        assert_eq!(value.as_deref(), Some("128"));
    }

    #[test]
    fn test_parse_setoption_multiword_name() {
        let tokens = ["name", "Move", "Overhead", "value", "50"];
        let (name, value) = parse_setoption(&tokens).unwrap();
        assert_eq!(name, "Move Overhead");
        assert_eq!(value.as_deref(), Some("50"));
    }

    #[test]
    fn test_parse_setoption_no_value() {
        let tokens = ["name", "Clear"];
        let (name, value) = parse_setoption(&tokens).unwrap();
        assert_eq!(name, "Clear");
        assert!(value.is_none());
    }

    #[test]
    fn test_parse_setoption_missing_name() {
        assert!(parse_setoption(&["value", "1"]).is_none());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("off"));
    }
}
