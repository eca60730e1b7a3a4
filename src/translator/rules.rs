use super::TranslationRule;
use crate::shell::ShellVariant::{self, Linux, MacOs, Mobile, Windows};
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashMap};

const fn rule(pattern: &'static str, replacement: &'static str) -> TranslationRule {
    TranslationRule { pattern, replacement }
}

const LINUX_TO_WINDOWS: &[TranslationRule] = &[
    rule("ls -la", "Get-ChildItem -Force"),
    rule("ls -l", "Get-ChildItem"),
    rule("ls", "Get-ChildItem"),
    rule("cd", "Set-Location"),
    rule("pwd", "Get-Location"),
    rule("rm -rf", "Remove-Item -Recurse -Force"),
    rule("rm -r", "Remove-Item -Recurse"),
    rule("rm", "Remove-Item"),
    rule("cp -r", "Copy-Item -Recurse"),
    rule("cp", "Copy-Item"),
    rule("mv", "Move-Item"),
    rule("cat", "Get-Content"),
    rule("clear", "Clear-Host"),
    rule("ps aux", "Get-Process"),
    rule("ps", "Get-Process"),
    rule("kill -9", "Stop-Process -Force"),
    rule("kill", "Stop-Process"),
    rule("echo", "Write-Output"),
    rule("grep", "Select-String"),
    rule("find", "Get-ChildItem -Recurse"),
    rule("touch", "New-Item -ItemType File"),
    rule("mkdir", "New-Item -ItemType Directory"),
    rule("chmod", "icacls"),
    rule("which", "Get-Command"),
    rule("head", "Get-Content -TotalCount 10"),
    rule("tail", "Get-Content -Tail 10"),
];

const MACOS_TO_WINDOWS: &[TranslationRule] = &[
    rule("ls -la", "Get-ChildItem -Force"),
    rule("ls -l", "Get-ChildItem"),
    rule("ls", "Get-ChildItem"),
    rule("cd", "Set-Location"),
    rule("pwd", "Get-Location"),
    rule("rm -rf", "Remove-Item -Recurse -Force"),
    rule("rm", "Remove-Item"),
    rule("cp -r", "Copy-Item -Recurse"),
    rule("cp", "Copy-Item"),
    rule("mv", "Move-Item"),
    rule("cat", "Get-Content"),
    rule("clear", "Clear-Host"),
    rule("ps aux", "Get-Process"),
    rule("kill", "Stop-Process"),
    rule("echo", "Write-Output"),
    rule("open", "Invoke-Item"),
    rule("brew install", "choco install"),
    rule("brew", "choco"),
];

const WINDOWS_TO_LINUX: &[TranslationRule] = &[
    rule("Get-ChildItem -Force", "ls -la"),
    rule("Get-ChildItem -Recurse", "find"),
    rule("Get-ChildItem", "ls"),
    rule("Set-Location", "cd"),
    rule("Get-Location", "pwd"),
    rule("Remove-Item -Recurse -Force", "rm -rf"),
    rule("Remove-Item -Recurse", "rm -r"),
    rule("Remove-Item", "rm"),
    rule("Copy-Item -Recurse", "cp -r"),
    rule("Copy-Item", "cp"),
    rule("Move-Item", "mv"),
    rule("Get-Content", "cat"),
    rule("Clear-Host", "clear"),
    rule("Get-Process", "ps aux"),
    rule("Stop-Process -Force", "kill -9"),
    rule("Stop-Process", "kill"),
    rule("Write-Output", "echo"),
    rule("Select-String", "grep"),
    rule("New-Item -ItemType File", "touch"),
    rule("New-Item -ItemType Directory", "mkdir"),
    rule("Test-Path", "test -e"),
    rule("Get-Command", "which"),
];

const WINDOWS_TO_MACOS: &[TranslationRule] = &[
    rule("Get-ChildItem -Force", "ls -la"),
    rule("Get-ChildItem", "ls"),
    rule("Set-Location", "cd"),
    rule("Get-Location", "pwd"),
    rule("Remove-Item -Recurse -Force", "rm -rf"),
    rule("Remove-Item", "rm"),
    rule("Copy-Item -Recurse", "cp -r"),
    rule("Copy-Item", "cp"),
    rule("Move-Item", "mv"),
    rule("Get-Content", "cat"),
    rule("Clear-Host", "clear"),
    rule("Get-Process", "ps aux"),
    rule("Stop-Process", "kill"),
    rule("Write-Output", "echo"),
    rule("Invoke-Item", "open"),
    rule("choco install", "brew install"),
    rule("choco", "brew"),
];

const LINUX_TO_MACOS: &[TranslationRule] = &[
    rule("apt-get install", "brew install"),
    rule("apt-get", "brew"),
    rule("apt install", "brew install"),
    rule("yum install", "brew install"),
    rule("yum", "brew"),
    rule("systemctl", "launchctl"),
    rule("xdg-open", "open"),
];

const MACOS_TO_LINUX: &[TranslationRule] = &[
    rule("brew install", "apt-get install"),
    rule("brew", "apt-get"),
    rule("launchctl", "systemctl"),
    rule("open", "xdg-open"),
];

const MOBILE_TO_MACOS: &[TranslationRule] = &[
    rule("ideviceinfo", "system_profiler SPHardwareDataType"),
    rule("idevicediagnostics", "system_profiler"),
    rule("idevicefs ls", "ls"),
    rule("idevicefs cat", "cat"),
];

const MACOS_TO_MOBILE: &[TranslationRule] = &[
    rule("system_profiler", "ideviceinfo"),
    rule("ls", "idevicefs ls"),
    rule("cat", "idevicefs cat"),
];

const MOBILE_TO_LINUX: &[TranslationRule] = &[
    rule("ideviceinfo", "uname -a"),
    rule("idevicediagnostics", "cat /proc/cpuinfo"),
    rule("idevicefs ls", "ls"),
    rule("idevicefs cat", "cat"),
];

const LINUX_TO_MOBILE: &[TranslationRule] = &[
    rule("uname", "ideviceinfo"),
    rule("ls", "idevicefs ls"),
    rule("cat", "idevicefs cat"),
];

const MOBILE_TO_WINDOWS: &[TranslationRule] = &[
    rule("ideviceinfo", "Get-ComputerInfo"),
    rule("idevicefs ls", "Get-ChildItem"),
    rule("idevicefs cat", "Get-Content"),
];

const WINDOWS_TO_MOBILE: &[TranslationRule] = &[
    rule("Get-ComputerInfo", "ideviceinfo"),
    rule("Get-ChildItem", "idevicefs ls"),
    rule("Get-Content", "idevicefs cat"),
    rule("Get-Process", "ideviceinfo"),
];

/// Rule tables keyed by ordered `(source, target)` pair
pub(super) static RULE_TABLES: Lazy<HashMap<(ShellVariant, ShellVariant), &'static [TranslationRule]>> =
    Lazy::new(|| {
        let mut m: HashMap<(ShellVariant, ShellVariant), &'static [TranslationRule]> = HashMap::new();

        m.insert((Linux, Windows), LINUX_TO_WINDOWS);
        m.insert((MacOs, Windows), MACOS_TO_WINDOWS);
        m.insert((Windows, Linux), WINDOWS_TO_LINUX);
        m.insert((Windows, MacOs), WINDOWS_TO_MACOS);
        m.insert((Linux, MacOs), LINUX_TO_MACOS);
        m.insert((MacOs, Linux), MACOS_TO_LINUX);
        m.insert((Mobile, MacOs), MOBILE_TO_MACOS);
        m.insert((MacOs, Mobile), MACOS_TO_MOBILE);
        m.insert((Mobile, Linux), MOBILE_TO_LINUX);
        m.insert((Linux, Mobile), LINUX_TO_MOBILE);
        m.insert((Mobile, Windows), MOBILE_TO_WINDOWS);
        m.insert((Windows, Mobile), WINDOWS_TO_MOBILE);

        m
    });

/// Canonical operations and their idiom on each variant
const COMMON_COMMANDS: &[(&str, [&str; 4])] = &[
    // (name, [linux, macos, mobile, windows])
    ("list_files", ["ls -la", "ls -la", "idevicefs ls", "Get-ChildItem -Force"]),
    ("change_directory", ["cd", "cd", "cd", "Set-Location"]),
    ("print_working_directory", ["pwd", "pwd", "pwd", "Get-Location"]),
    ("remove", ["rm -rf", "rm -rf", "rm -rf", "Remove-Item -Recurse -Force"]),
    ("copy", ["cp -r", "cp -r", "cp -r", "Copy-Item -Recurse"]),
    ("move", ["mv", "mv", "mv", "Move-Item"]),
    ("read_file", ["cat", "cat", "idevicefs cat", "Get-Content"]),
    ("clear_screen", ["clear", "clear", "clear", "Clear-Host"]),
    ("list_processes", ["ps aux", "ps aux", "ps aux", "Get-Process"]),
];

pub(super) static COMMON_TABLE: Lazy<BTreeMap<&'static str, BTreeMap<ShellVariant, &'static str>>> =
    Lazy::new(|| {
        COMMON_COMMANDS
            .iter()
            .map(|(name, idioms)| {
                let per_variant = ShellVariant::ALL.iter().copied().zip(idioms.iter().copied()).collect();
                (*name, per_variant)
            })
            .collect()
    });
