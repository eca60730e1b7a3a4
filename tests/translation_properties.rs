use polyshell::paths;
use polyshell::shell::ShellVariant;
use polyshell::translator::translate;
use proptest::prelude::*;

fn variant() -> impl Strategy<Value = ShellVariant> {
    prop::sample::select(ShellVariant::ALL.to_vec())
}

proptest! {
    #[test]
    fn same_variant_is_identity(command in ".{0,64}", v in variant()) {
        prop_assert_eq!(translate(&command, v, v), command);
    }

    #[test]
    fn unmatched_commands_pass_through(rest in "[ -~]{0,48}", source in variant(), target in variant()) {
        // No rule pattern starts with "zz"
        let command = format!("zz{rest}");
        prop_assert_eq!(translate(&command, source, target), command);
    }

    #[test]
    fn translation_keeps_the_suffix(suffix in "( [a-z0-9./_-]{1,12}){0,3}") {
        let command = format!("ls -la{suffix}");
        let translated = translate(&command, ShellVariant::Linux, ShellVariant::Windows);
        prop_assert_eq!(translated, format!("Get-ChildItem -Force{suffix}"));
    }

    #[test]
    fn drive_paths_round_trip(
        drive in "[A-Z]",
        parts in prop::collection::vec("[A-Za-z0-9_]{1,8}", 1..5),
    ) {
        let windows = format!("{drive}:\\{}", parts.join("\\"));
        let posix = paths::convert(&windows, ShellVariant::Windows, ShellVariant::Linux);
        prop_assert!(posix.starts_with("/mnt/"));
        prop_assert_eq!(paths::convert(&posix, ShellVariant::Linux, ShellVariant::Windows), windows);
    }
}
