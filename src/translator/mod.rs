//! Command translation between shell vocabularies
//!
//! Translation is a surface rewrite: each ordered `(source, target)` pair has
//! a static table of prefix rules. The longest pattern that prefixes the
//! command wins, its prefix is swapped for the replacement and the rest of
//! the command is kept verbatim. Commands no rule matches pass through.

mod rules;

use crate::error::Result;
use crate::shell::ShellVariant;
use std::collections::BTreeMap;

/// One prefix rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationRule {
    pub pattern: &'static str,
    pub replacement: &'static str,
}

/// Detailed outcome of a translation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationResult {
    pub translated: bool,
    pub original_command: String,
    pub final_command: String,
    pub matched_rule: Option<TranslationRule>,
}

/// Pick the rule with the longest matching pattern.
///
/// Ties go to the rule declared first.
#[must_use]
pub fn select_rule<'a>(rules: &'a [TranslationRule], command: &str) -> Option<&'a TranslationRule> {
    rules
        .iter()
        .filter(|rule| command.starts_with(rule.pattern))
        .fold(None::<&'a TranslationRule>, |best, rule| match best {
            Some(current) if current.pattern.len() >= rule.pattern.len() => Some(current),
            _ => Some(rule),
        })
}

/// Apply a rule table to a command
#[must_use]
pub fn apply_rules(rules: &[TranslationRule], command: &str) -> String {
    match select_rule(rules, command) {
        Some(rule) => format!("{}{}", rule.replacement, &command[rule.pattern.len()..]),
        None => command.to_string(),
    }
}

/// Rule table for an ordered pair, if one exists
#[must_use]
pub fn rules_for(source: ShellVariant, target: ShellVariant) -> Option<&'static [TranslationRule]> {
    rules::RULE_TABLES.get(&(source, target)).copied()
}

/// Translate `command` from `source` to `target`
#[must_use]
pub fn translate(command: &str, source: ShellVariant, target: ShellVariant) -> String {
    translate_detailed(command, source, target).final_command
}

/// Translate and report which rule fired
#[must_use]
pub fn translate_detailed(command: &str, source: ShellVariant, target: ShellVariant) -> TranslationResult {
    let unchanged = || TranslationResult {
        translated: false,
        original_command: command.to_string(),
        final_command: command.to_string(),
        matched_rule: None,
    };

    if source == target {
        return unchanged();
    }

    let Some(table) = rules_for(source, target) else {
        return unchanged();
    };

    match select_rule(table, command) {
        Some(rule) => TranslationResult {
            translated: true,
            original_command: command.to_string(),
            final_command: format!("{}{}", rule.replacement, &command[rule.pattern.len()..]),
            matched_rule: Some(*rule),
        },
        None => unchanged(),
    }
}

/// Translate using variant names, as typed by an operator.
///
/// # Errors
/// Returns [`Error::UnsupportedSystem`](crate::Error::UnsupportedSystem) when
/// either name is not a known variant.
pub fn translate_named(command: &str, source: &str, target: &str) -> Result<String> {
    if source.trim().eq_ignore_ascii_case(target.trim()) {
        return Ok(command.to_string());
    }
    let source: ShellVariant = source.parse()?;
    let target: ShellVariant = target.parse()?;
    Ok(translate(command, source, target))
}

/// Translate `command` into every other variant
#[must_use]
pub fn suggest_translations(command: &str, source: ShellVariant) -> BTreeMap<ShellVariant, String> {
    ShellVariant::ALL
        .iter()
        .copied()
        .filter(|target| *target != source)
        .map(|target| (target, translate(command, source, target)))
        .collect()
}

/// Cross-reference of canonical operations to each variant's idiom
#[must_use]
pub fn common_commands() -> &'static BTreeMap<&'static str, BTreeMap<ShellVariant, &'static str>> {
    &rules::COMMON_TABLE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use ShellVariant::{Linux, MacOs, Mobile, Windows};

    #[test]
    fn test_identity() {
        for variant in ShellVariant::ALL {
            assert_eq!(translate("ls -la /tmp", variant, variant), "ls -la /tmp");
        }
    }

    #[test]
    fn test_ls_la_to_windows() {
        assert_eq!(translate("ls -la", Linux, Windows), "Get-ChildItem -Force");
    }

    #[test]
    fn test_longest_prefix_wins() {
        const RULES: &[TranslationRule] = &[
            TranslationRule { pattern: "rm", replacement: "B" },
            TranslationRule { pattern: "rm -rf", replacement: "A" },
        ];
        assert_eq!(apply_rules(RULES, "rm -rf /tmp/x"), "A /tmp/x");
        assert_eq!(apply_rules(RULES, "rm file"), "B file");
    }

    #[test]
    fn test_tie_goes_to_first_declared() {
        const RULES: &[TranslationRule] = &[
            TranslationRule { pattern: "cat", replacement: "first" },
            TranslationRule { pattern: "cat", replacement: "second" },
        ];
        assert_eq!(apply_rules(RULES, "cat a.txt"), "first a.txt");
    }

    #[test]
    fn test_remainder_kept_verbatim() {
        assert_eq!(
            translate("rm -rf  build/  # cleanup", Linux, Windows),
            "Remove-Item -Recurse -Force  build/  # cleanup"
        );
    }

    #[test]
    fn test_passthrough() {
        assert_eq!(translate("uptime", Linux, Windows), "uptime");
        let detailed = translate_detailed("uptime", Linux, Windows);
        assert!(!detailed.translated);
        assert!(detailed.matched_rule.is_none());
    }

    #[test]
    fn test_reverse_direction() {
        assert_eq!(translate("Get-ChildItem -Force C:\\", Windows, Linux), "ls -la C:\\");
        assert_eq!(translate("Remove-Item -Recurse x", Windows, Linux), "rm -r x");
    }

    #[test]
    fn test_mobile_tables() {
        assert_eq!(translate("ideviceinfo", Mobile, MacOs), "system_profiler SPHardwareDataType");
        assert_eq!(translate("ls /Documents", Linux, Mobile), "idevicefs ls /Documents");
    }

    #[test]
    fn test_detailed_reports_rule() {
        let result = translate_detailed("brew install jq", MacOs, Linux);
        assert!(result.translated);
        assert_eq!(result.final_command, "apt-get install jq");
        assert_eq!(result.matched_rule.map(|r| r.pattern), Some("brew install"));
    }

    #[test]
    fn test_translate_named_rejects_unknown() {
        let err = translate_named("ls", "linux", "beos").unwrap_err();
        assert!(matches!(err, Error::UnsupportedSystem(name) if name == "beos"));
        assert_eq!(translate_named("ls -la", "linux", "powershell").unwrap(), "Get-ChildItem -Force");
    }

    #[test]
    fn test_suggestions_cover_other_variants() {
        let suggestions = suggest_translations("ls -la", Linux);
        assert_eq!(suggestions.len(), 3);
        assert!(!suggestions.contains_key(&Linux));
        assert_eq!(suggestions[&Windows], "Get-ChildItem -Force");
        assert_eq!(suggestions[&Mobile], "idevicefs ls -la");
        assert_eq!(suggestions[&MacOs], "ls -la");
    }

    #[test]
    fn test_common_commands_table() {
        let table = common_commands();
        assert_eq!(table.len(), 9);
        assert_eq!(table["list_files"][&Windows], "Get-ChildItem -Force");
        assert_eq!(table["read_file"][&Mobile], "idevicefs cat");
        assert!(table.values().all(|m| m.len() == ShellVariant::ALL.len()));
    }
}
