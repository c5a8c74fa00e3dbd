use super::*;

use std::fs;
use std::path::Path;

use agentkit_core::Catalog;
use agentkit_installer::{
    execute, list_snapshots, section_markers, FailurePolicy, InstallLayout, InstallPlanner,
    PipelineOptions, StagePlan, Step,
};
use anyhow::anyhow;
use clap::error::ErrorKind;
use tempfile::TempDir;

use crate::completion::{detect_shell_from_env, resolve_completion_shell, write_completions_script};
use crate::dispatch::{
    load_catalog, pipeline_options, platform_profile, resolve_selection, select_snapshot,
};
use crate::render::{
    format_execution_lines, format_plan_lines, format_snapshot_lines, render_status_line,
    resolve_output_style, OutputStyle,
};

const TEST_CATALOG: &str = r###"
[[components]]
id = "engram"
prompt = "## Memory\nuse engram\n"

[components.mcp.engram]
command = "engram"

[[components]]
id = "sdd"
dependencies = ["engram"]

[components.settings]
model = "sonnet"

[[agents]]
id = "codex"
config_dir = ".codex"
settings_file = ".codex/settings.json"
system_prompt_file = ".codex/AGENTS.md"
skills_dir = ".codex/skills"
system_prompt = "marked-section"
mcp = "merge-into-settings"

[[agents]]
id = "plan9-agent"
config_dir = ".p9"
settings_file = ".p9/settings.json"
system_prompt_file = ".p9/PROMPT.md"
skills_dir = ".p9/skills"
system_prompt = "append"
mcp = "merge-into-settings"
platforms = ["plan9"]
"###;

struct Workspace {
    root: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let root = tempfile::Builder::new()
            .prefix("agentkit-cli-tests-")
            .tempdir()
            .expect("must create scratch dir");
        let workspace = Self { root };
        fs::write(workspace.catalog(), TEST_CATALOG).expect("must write catalog");
        workspace
    }

    fn home(&self) -> PathBuf {
        self.root.path().join("home")
    }

    fn state(&self) -> PathBuf {
        self.root.path().join("state")
    }

    fn catalog(&self) -> PathBuf {
        self.root.path().join("catalog.toml")
    }

    fn layout(&self) -> InstallLayout {
        InstallLayout::new(self.home(), self.state())
    }

    fn cli(&self, args: &[&str]) -> Cli {
        let home = self.home();
        let state = self.state();
        let catalog = self.catalog();
        let mut argv = vec![
            "agentkit",
            "--home",
            home.to_str().expect("utf8 path"),
            "--state-dir",
            state.to_str().expect("utf8 path"),
            "--catalog",
            catalog.to_str().expect("utf8 path"),
        ];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("command must parse")
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).expect("file must be readable")
}

fn test_catalog() -> Catalog {
    Catalog::from_toml_str(TEST_CATALOG).expect("catalog must parse")
}

#[test]
fn cli_parses_install_selection_and_policies() {
    let cli = Cli::try_parse_from([
        "agentkit",
        "-vv",
        "install",
        "--agent",
        "claude-code,codex",
        "--component",
        "sdd",
        "--component",
        "persona",
        "--keep-going",
        "--no-rollback",
        "--skip-install",
        "--package-manager",
        "npm",
    ])
    .expect("command must parse");

    assert_eq!(cli.verbose, 2);
    match cli.command {
        Commands::Install {
            selection,
            dry_run,
            no_rollback,
            keep_going,
            json,
        } => {
            assert_eq!(selection.agents, vec!["claude-code", "codex"]);
            assert_eq!(selection.components, vec!["sdd", "persona"]);
            assert_eq!(selection.package_manager.as_deref(), Some("npm"));
            assert!(selection.skip_install);
            assert!(no_rollback);
            assert!(keep_going);
            assert!(!dry_run);
            assert!(!json);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn cli_accepts_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["agentkit", "snapshots", "--state-dir", "/tmp/agentkit-state"])
        .expect("command must parse");
    assert_eq!(cli.state_dir, Some(PathBuf::from("/tmp/agentkit-state")));
    assert!(matches!(cli.command, Commands::Snapshots { json: false }));
}

#[test]
fn cli_rejects_unknown_completion_shell() {
    let err = Cli::try_parse_from(["agentkit", "completions", "tcsh"])
        .expect_err("unknown shell must fail");
    assert_eq!(err.kind(), ErrorKind::InvalidValue);

    let cli = Cli::try_parse_from(["agentkit", "completions", "powershell"])
        .expect("command must parse");
    assert!(matches!(
        cli.command,
        Commands::Completions {
            shell: Some(CliCompletionShell::Powershell)
        }
    ));
}

#[test]
fn default_log_level_follows_verbosity() {
    assert_eq!(default_log_level(0), "warn");
    assert_eq!(default_log_level(1), "info");
    assert_eq!(default_log_level(5), "debug");
}

#[test]
fn render_status_line_plain_is_unadorned() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "install complete"),
        "install complete"
    );
}

#[test]
fn render_status_line_rich_includes_ascii_badge() {
    assert_eq!(
        render_status_line(OutputStyle::Rich, "ok", "install complete"),
        "[OK] install complete"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "warn", "changes rolled back"),
        "[WARN] changes rolled back"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "err", "rollback failed"),
        "[ERR] rollback failed"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "pending", "queued"),
        "[..] queued"
    );
}

#[test]
fn output_style_is_plain_off_terminal_or_with_no_color() {
    assert_eq!(resolve_output_style(true, false), OutputStyle::Rich);
    assert_eq!(resolve_output_style(false, false), OutputStyle::Plain);
    assert_eq!(resolve_output_style(true, true), OutputStyle::Plain);
}

#[test]
fn completion_shell_prefers_request_then_env_then_platform() {
    assert_eq!(
        resolve_completion_shell(Some(CliCompletionShell::Fish), Some("/bin/zsh"), false),
        CliCompletionShell::Fish
    );
    assert_eq!(
        resolve_completion_shell(None, Some("/usr/bin/zsh"), false),
        CliCompletionShell::Zsh
    );
    assert_eq!(
        resolve_completion_shell(None, Some("/bin/tcsh"), true),
        CliCompletionShell::Powershell
    );
    assert_eq!(resolve_completion_shell(None, None, false), CliCompletionShell::Bash);
    assert_eq!(detect_shell_from_env(Some("pwsh")), Some(CliCompletionShell::Powershell));
}

#[test]
fn completions_script_names_the_binary() {
    let mut output = Vec::new();
    write_completions_script(CliCompletionShell::Bash, &mut output).expect("must generate");
    let script = String::from_utf8(output).expect("utf8");
    assert!(script.contains("agentkit"));
    assert!(script.contains("snapshots"));
}

#[test]
fn pipeline_options_map_flags() {
    assert_eq!(pipeline_options(false, false), PipelineOptions::default());

    let options = pipeline_options(true, true);
    assert_eq!(options.apply_policy, FailurePolicy::ContinueCollecting);
    assert!(!options.rollback.enabled);
}

#[test]
fn platform_profile_rejects_unknown_package_manager() {
    let err = platform_profile(Some("chocolatey")).expect_err("unknown manager must fail");
    assert!(err.to_string().contains("unknown package manager 'chocolatey'"));

    let profile = platform_profile(Some("homebrew")).expect("alias must parse");
    assert_eq!(profile.package_manager.map(|m| m.as_str()), Some("brew"));
}

#[test]
fn load_catalog_reads_flag_path_and_reports_bad_files() {
    let workspace = Workspace::new();
    let catalog = load_catalog(Some(&workspace.catalog())).expect("catalog must load");
    assert_eq!(catalog, test_catalog());

    let broken = workspace.root.path().join("broken.toml");
    fs::write(&broken, "[[components]]\nid = \"a\"\ndependencies = [\"a\"]\n").expect("write");
    let err = load_catalog(Some(&broken)).expect_err("self dependency must fail");
    assert!(format!("{err:#}").contains("depends on itself"));

    let missing = workspace.root.path().join("missing.toml");
    let err = load_catalog(Some(&missing)).expect_err("missing file must fail");
    assert!(err.to_string().contains("failed to read catalog"));
}

#[test]
fn plan_lines_list_order_dependencies_and_unsupported_agents() {
    let workspace = Workspace::new();
    let catalog = test_catalog();
    let profile = platform_profile(None).expect("detect");
    let selection = SelectionArgs {
        agents: vec!["codex".to_string(), "plan9-agent".to_string()],
        components: vec!["sdd".to_string()],
        skip_install: true,
        ..SelectionArgs::default()
    };

    let resolved = resolve_selection(&catalog, &profile, &selection).expect("must resolve");
    let layout = workspace.layout();
    let plan = InstallPlanner::new(&layout, &catalog, &profile)
        .skip_install(true)
        .plan(&resolved)
        .expect("must plan");

    let lines = format_plan_lines(&resolved, &plan);
    assert_eq!(lines[0], "components: engram, sdd");
    assert_eq!(lines[1], "added dependencies: engram");
    assert_eq!(lines[3], "unsupported agents: plan9-agent");
    assert!(lines.contains(&"  inject:codex:engram".to_string()));
    assert!(lines.contains(&"  inject:codex:sdd".to_string()));
    assert!(lines.contains(&format!(
        "  {}",
        workspace.home().join(".codex/settings.json").display()
    )));
}

#[test]
fn resolve_selection_surfaces_unknown_components() {
    let catalog = test_catalog();
    let profile = platform_profile(None).expect("detect");
    let selection = SelectionArgs {
        agents: vec!["codex".to_string()],
        components: vec!["nope".to_string()],
        ..SelectionArgs::default()
    };
    let err = resolve_selection(&catalog, &profile, &selection).expect_err("must fail");
    assert!(err.to_string().contains("nope"));
}

#[test]
fn execution_lines_report_rollback() {
    let plan = StagePlan::new(
        Vec::new(),
        vec![
            Step::reversible("inject:codex:engram", || Ok(()), || Ok(())),
            Step::one_shot("inject:codex:sdd", || Err(anyhow!("bad settings"))),
        ],
    )
    .expect("valid plan");
    let result = execute(plan, PipelineOptions::default());
    assert_eq!(CommandOutcome::from_execution(&result), CommandOutcome::Failed);

    let lines = format_execution_lines(OutputStyle::Rich, "s1", &result);
    assert_eq!(
        lines,
        vec![
            "[WARN] inject:codex:engram: rolled back",
            "[ERR] inject:codex:sdd: failed (reason=bad settings)",
            "[WARN] install failed; changes rolled back (snapshot=s1)",
        ]
    );
}

#[test]
fn rollback_failure_maps_to_distinct_outcome() {
    let plan = StagePlan::new(
        Vec::new(),
        vec![
            Step::reversible("a", || Ok(()), || Err(anyhow!("disk gone"))),
            Step::one_shot("b", || Err(anyhow!("boom"))),
        ],
    )
    .expect("valid plan");
    let result = execute(plan, PipelineOptions::default());
    assert_eq!(
        CommandOutcome::from_execution(&result),
        CommandOutcome::RollbackFailed
    );

    let lines = format_execution_lines(OutputStyle::Plain, "s2", &result);
    assert!(lines.contains(&"a: rollback failed (reason=disk gone)".to_string()));
    assert_eq!(
        lines.last().map(String::as_str),
        Some("rollback failed; files may be left modified (restore with: agentkit restore --snapshot s2)")
    );
}

#[test]
fn install_restore_round_trip_through_cli() {
    let workspace = Workspace::new();
    let agents_md = workspace.home().join(".codex/AGENTS.md");
    fs::create_dir_all(agents_md.parent().expect("parent")).expect("mkdir");
    fs::write(&agents_md, "# Team rules\n").expect("seed");

    let outcome = run_cli(workspace.cli(&[
        "install",
        "--agent",
        "codex",
        "--component",
        "sdd",
        "--skip-install",
    ]))
    .expect("install must run");
    assert_eq!(outcome, CommandOutcome::Success);

    let (open, close) = section_markers("engram");
    assert_eq!(
        read(&agents_md),
        format!("# Team rules\n\n{open}\n## Memory\nuse engram\n{close}\n")
    );
    let settings: serde_json::Value =
        serde_json::from_str(&read(&workspace.home().join(".codex/settings.json")))
            .expect("json");
    assert_eq!(settings["model"], serde_json::json!("sonnet"));
    assert_eq!(
        settings["mcpServers"]["engram"]["command"],
        serde_json::json!("engram")
    );

    let outcome = run_cli(workspace.cli(&["restore"])).expect("restore must run");
    assert_eq!(outcome, CommandOutcome::Success);
    assert_eq!(read(&agents_md), "# Team rules\n");
    assert!(!workspace.home().join(".codex/settings.json").exists());
}

#[test]
fn failed_install_exits_non_zero_and_leaves_files_untouched() {
    let workspace = Workspace::new();
    let settings = workspace.home().join(".codex/settings.json");
    fs::create_dir_all(settings.parent().expect("parent")).expect("mkdir");
    fs::write(&settings, "[]").expect("seed non-object settings");

    let outcome = run_cli(workspace.cli(&[
        "install",
        "--agent",
        "codex",
        "--component",
        "sdd",
        "--skip-install",
    ]))
    .expect("install must run");
    assert_eq!(outcome, CommandOutcome::Failed);
    assert_eq!(read(&settings), "[]");
    assert!(!workspace.home().join(".codex/AGENTS.md").exists());
}

#[test]
fn dry_run_touches_nothing() {
    let workspace = Workspace::new();
    let outcome = run_cli(workspace.cli(&[
        "install",
        "--agent",
        "codex",
        "--component",
        "engram",
        "--skip-install",
        "--dry-run",
    ]))
    .expect("dry run must succeed");
    assert_eq!(outcome, CommandOutcome::Success);
    assert!(!workspace.home().exists());
    assert!(!workspace.state().exists());
}

#[test]
fn select_snapshot_defaults_to_newest_and_errors_when_empty() {
    let workspace = Workspace::new();
    let layout = workspace.layout();
    let err = select_snapshot(&layout, None).expect_err("no snapshots yet");
    assert!(err.to_string().contains("no snapshots found"));

    for _ in 0..2 {
        run_cli(workspace.cli(&[
            "install",
            "--agent",
            "codex",
            "--component",
            "engram",
            "--skip-install",
        ]))
        .expect("install must run");
    }
    let manifests = list_snapshots(&layout.snapshots_dir()).expect("must list");
    assert_eq!(manifests.len(), 2);

    let newest = select_snapshot(&layout, None).expect("newest");
    assert_eq!(newest.id, manifests[1].id);
    let named = select_snapshot(&layout, Some(&manifests[0].id)).expect("named");
    assert_eq!(named.id, manifests[0].id);
    assert!(select_snapshot(&layout, Some("does-not-exist")).is_err());

    let lines = format_snapshot_lines(&manifests);
    assert!(lines[0].starts_with(&manifests[0].id));
    assert!(lines[0].ends_with("files=0 absent=2"));
    assert!(lines[1].ends_with("files=2 absent=0"));
}

#[test]
fn snapshot_lines_say_when_there_are_none() {
    assert_eq!(format_snapshot_lines(&[]), vec!["no snapshots"]);
}
