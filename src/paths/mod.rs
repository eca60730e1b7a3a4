//! Path conversion between POSIX and Windows syntax
//!
//! `std::path` only understands the host's conventions, so paths are handled
//! here as plain strings split by the target variant's rules.
//!
//! # Conventions
//! - `C:\Users\x` maps to `/mnt/c/Users/x` and back
//! - `/c/Users/x` is also read as drive `C:` when converting to Windows
//! - anything else only has its separators swapped

use crate::shell::{PathFamily, ShellVariant};
use once_cell::sync::Lazy;
use regex::Regex;

/// Placeholder user segment used by [`expand_home`]
pub const DEFAULT_HOME_USER: &str = "user";

static MOUNT_DRIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/mnt/([A-Za-z])(?:/(.*))?$").expect("valid mount-point regex"));

static LETTER_DRIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/([A-Za-z])(?:/(.*))?$").expect("valid drive-segment regex"));

/// A path split into its anchor (drive and/or root) and components
#[derive(Debug, Clone, PartialEq, Eq)]
struct SplitPath<'a> {
    drive: String,
    root: bool,
    parts: Vec<&'a str>,
}

impl SplitPath<'_> {
    fn is_absolute(&self, family: PathFamily) -> bool {
        match family {
            PathFamily::Posix => self.root,
            PathFamily::Windows => self.root && !self.drive.is_empty(),
        }
    }

    fn render(&self, family: PathFamily) -> String {
        let sep = separator(family);
        let mut out = self.drive.clone();
        if self.root {
            out.push(sep);
        }
        out.push_str(&self.parts.join(&sep.to_string()));
        if out.is_empty() {
            out.push('.');
        }
        out
    }
}

fn separator(family: PathFamily) -> char {
    match family {
        PathFamily::Posix => '/',
        PathFamily::Windows => '\\',
    }
}

fn split(path: &str, family: PathFamily) -> SplitPath<'_> {
    match family {
        PathFamily::Posix => SplitPath {
            drive: String::new(),
            root: path.starts_with('/'),
            parts: path.split('/').filter(|p| !p.is_empty() && *p != ".").collect(),
        },
        PathFamily::Windows => split_windows(path),
    }
}

fn split_windows(path: &str) -> SplitPath<'_> {
    let is_sep = |c: char| c == '\\' || c == '/';
    let bytes = path.as_bytes();

    let (drive, rest) = if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        (path[..2].to_string(), &path[2..])
    } else if path.len() > 2 && path.starts_with(is_sep) && path[1..].starts_with(is_sep) {
        // \\server\share\rest
        let mut segments = path[2..].splitn(3, is_sep);
        let server = segments.next().unwrap_or_default();
        let share = segments.next().unwrap_or_default();
        let rest = segments.next().unwrap_or_default();
        return SplitPath {
            drive: format!("\\\\{server}\\{share}"),
            root: true,
            parts: rest.split(is_sep).filter(|p| !p.is_empty() && *p != ".").collect(),
        };
    } else {
        (String::new(), path)
    };

    SplitPath {
        drive,
        root: rest.starts_with(is_sep),
        parts: rest.split(is_sep).filter(|p| !p.is_empty() && *p != ".").collect(),
    }
}

/// Convert `path` from the syntax of `source` to that of `target`
#[must_use]
pub fn convert(path: &str, source: ShellVariant, target: ShellVariant) -> String {
    match (source.path_family(), target.path_family()) {
        (PathFamily::Windows, PathFamily::Posix) => windows_to_posix(path),
        (PathFamily::Posix, PathFamily::Windows) => posix_to_windows(path),
        _ => path.to_string(),
    }
}

fn windows_to_posix(path: &str) -> String {
    let split = split_windows(path);
    let letter = split.drive.chars().next().filter(|_| split.drive.len() == 2);

    match letter {
        Some(letter) => {
            let mut out = format!("/mnt/{}", letter.to_ascii_lowercase());
            for part in &split.parts {
                out.push('/');
                out.push_str(part);
            }
            out
        }
        None => path.replace('\\', "/"),
    }
}

fn posix_to_windows(path: &str) -> String {
    let captures = MOUNT_DRIVE.captures(path).or_else(|| LETTER_DRIVE.captures(path));

    match captures {
        Some(caps) => {
            let drive = caps[1].to_ascii_uppercase();
            let rest = caps.get(2).map_or("", |m| m.as_str());
            format!("{drive}:\\{}", rest.replace('/', "\\"))
        }
        None => path.replace('/', "\\"),
    }
}

/// Home directory root for each variant
#[must_use]
pub fn home_root(variant: ShellVariant) -> &'static str {
    match variant {
        ShellVariant::Linux => "/home",
        ShellVariant::MacOs => "/Users",
        ShellVariant::Mobile => "/var/mobile",
        ShellVariant::Windows => "C:\\Users",
    }
}

/// Expand a leading `~` using the placeholder user
#[must_use]
pub fn expand_home(path: &str, variant: ShellVariant) -> String {
    expand_home_for(path, variant, DEFAULT_HOME_USER)
}

/// Expand a leading `~` to `<home root>/<user>`.
///
/// The user is not looked up; callers pass the segment they want.
#[must_use]
pub fn expand_home_for(path: &str, variant: ShellVariant, user: &str) -> String {
    let Some(rest) = path.strip_prefix('~') else {
        return path.to_string();
    };

    match variant.path_family() {
        PathFamily::Posix => format!("{}/{user}{rest}", home_root(variant)),
        PathFamily::Windows => format!("{}\\{user}{}", home_root(variant), rest.replace('/', "\\")),
    }
}

/// Collapse duplicate separators and `.` components
#[must_use]
pub fn normalize(path: &str, variant: ShellVariant) -> String {
    let family = variant.path_family();
    split(path, family).render(family)
}

#[must_use]
pub fn is_absolute(path: &str, variant: ShellVariant) -> bool {
    let family = variant.path_family();
    split(path, family).is_absolute(family)
}

/// Join components; an absolute component discards what came before it
#[must_use]
pub fn join(components: &[&str], variant: ShellVariant) -> String {
    let family = variant.path_family();
    let mut joined = SplitPath {
        drive: String::new(),
        root: false,
        parts: Vec::new(),
    };

    for component in components {
        let next = split(component, family);
        if !next.drive.is_empty() {
            joined = next;
        } else if next.root {
            joined.root = true;
            joined.parts = next.parts;
        } else {
            joined.parts.extend(next.parts);
        }
    }

    joined.render(family)
}

#[must_use]
pub fn parent(path: &str, variant: ShellVariant) -> String {
    let family = variant.path_family();
    let mut split = split(path, family);
    split.parts.pop();
    split.render(family)
}

/// Final component, empty for a bare root
#[must_use]
pub fn name(path: &str, variant: ShellVariant) -> String {
    split(path, variant.path_family())
        .parts
        .last()
        .map(|s| (*s).to_string())
        .unwrap_or_default()
}

/// Suffix of the final component including the dot, e.g. `.gz`
#[must_use]
pub fn extension(path: &str, variant: ShellVariant) -> String {
    let name = name(path, variant);
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => name[idx..].to_string(),
        _ => String::new(),
    }
}
