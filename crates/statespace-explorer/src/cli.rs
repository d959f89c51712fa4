use anyhow::Result;
use statespace_explorer::graph::{CapacityDecision, DisplayMode};
use statespace_explorer::pane::InsertPolicy;
use statespace_explorer::util::EngineConfig;
use std::ffi::OsString;
use std::path::PathBuf;

/// Command-line flags. Everything except the actions overrides the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub url: Option<String>,
    pub project: Option<String>,
    pub mode: Option<DisplayMode>,
    pub insert: Option<InsertPolicy>,
    pub max_panes: Option<usize>,
    pub policy: Option<String>,
    pub expand: Vec<String>,
    pub best_path: Option<usize>,
    pub on_capacity: CapacityDecision,
    pub mark: Vec<String>,
    pub recurrence: bool,
    pub import: Option<PathBuf>,
    pub export: Option<PathBuf>,
    pub overview: bool,
    pub save_config: bool,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            config: None,
            url: None,
            project: None,
            mode: None,
            insert: None,
            max_panes: None,
            policy: None,
            expand: Vec::new(),
            best_path: None,
            on_capacity: CapacityDecision::RedirectToNewPane,
            mark: Vec::new(),
            recurrence: false,
            import: None,
            export: None,
            overview: false,
            save_config: false,
        }
    }
}

impl CliArgs {
    pub fn apply(&self, cfg: &mut EngineConfig) {
        if let Some(url) = &self.url {
            cfg.backend_url = url.clone();
        }
        if let Some(project) = &self.project {
            cfg.project = project.clone();
        }
        if let Some(mode) = self.mode {
            cfg.default_mode = mode;
        }
        if let Some(insert) = self.insert {
            cfg.insert_policy = insert;
        }
        if let Some(max) = self.max_panes {
            cfg.max_panes = max;
        }
        if self.overview && cfg.overview_socket.is_none() {
            cfg.overview_socket = Some(cfg.overview_socket_path());
        }
    }
}

fn parse_decision(input: &str) -> Result<CapacityDecision> {
    match input {
        "redirect" => Ok(CapacityDecision::RedirectToNewPane),
        "proceed" => Ok(CapacityDecision::ProceedAnyway),
        "cancel" => Ok(CapacityDecision::Cancel),
        _ => anyhow::bail!("invalid capacity decision: {input} (expected redirect|proceed|cancel)"),
    }
}

pub fn parse_args() -> Result<CliArgs> {
    parse_args_from(std::env::args_os().skip(1))
}

fn value<I>(args: &mut I, flag: &str, expects: &str) -> Result<String>
where
    I: Iterator<Item = OsString>,
{
    let Some(v) = args.next() else {
        anyhow::bail!("{flag} expects {expects}");
    };
    Ok(v.to_string_lossy().into_owned())
}

fn parse_args_from<I>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = OsString>,
{
    let mut out = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let Some(flag) = arg.to_str() else {
            anyhow::bail!("unknown argument: {:?}", arg);
        };
        match flag {
            "--config" => out.config = Some(PathBuf::from(value(&mut args, flag, "a path")?)),
            "--url" => out.url = Some(value(&mut args, flag, "a URL")?),
            "--project" => out.project = Some(value(&mut args, flag, "a project name")?),
            "--mode" => {
                let v = value(&mut args, flag, "s|t|s+t")?;
                let Some(mode) = DisplayMode::parse(&v) else {
                    anyhow::bail!("invalid mode: {v} (expected s|t|s+t)");
                };
                out.mode = Some(mode);
            }
            "--insert" => {
                let v = value(&mut args, flag, "after|end")?;
                let Some(insert) = InsertPolicy::parse(&v) else {
                    anyhow::bail!("invalid insert policy: {v} (expected after|end)");
                };
                out.insert = Some(insert);
            }
            "--max-panes" => out.max_panes = Some(value(&mut args, flag, "a count")?.parse()?),
            "--policy" => out.policy = Some(value(&mut args, flag, "a scheduler name")?),
            "--expand" => out.expand.push(value(&mut args, flag, "a node id")?),
            "--best-path" => out.best_path = Some(value(&mut args, flag, "a step count")?.parse()?),
            "--on-capacity" => {
                out.on_capacity = parse_decision(&value(&mut args, flag, "redirect|proceed|cancel")?)?
            }
            "--mark" => out.mark.push(value(&mut args, flag, "a node id")?),
            "--recurrence" => out.recurrence = true,
            "--import" => out.import = Some(PathBuf::from(value(&mut args, flag, "a path")?)),
            "--export" => out.export = Some(PathBuf::from(value(&mut args, flag, "a path")?)),
            "--overview" => out.overview = true,
            "--save-config" => out.save_config = true,
            _ => anyhow::bail!("unknown argument: {:?}", arg),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<OsString> {
        raw.iter().map(OsString::from).collect()
    }

    #[test]
    fn parses_exploration_flags() {
        let parsed = parse_args_from(args(&[
            "--expand", "0", "--expand", "4", "--best-path", "3", "--policy", "Pmax", "--on-capacity", "cancel",
        ]))
        .expect("parsed");
        assert_eq!(parsed.expand, vec!["0".to_string(), "4".to_string()]);
        assert_eq!(parsed.best_path, Some(3));
        assert_eq!(parsed.policy.as_deref(), Some("Pmax"));
        assert_eq!(parsed.on_capacity, CapacityDecision::Cancel);
    }

    #[test]
    fn flags_override_config() {
        let parsed = parse_args_from(args(&["--url", "http://h:9/", "--project", "dice", "--mode", "s+t"]))
            .expect("parsed");
        let mut cfg = EngineConfig::default();
        parsed.apply(&mut cfg);
        assert_eq!(cfg.backend_base(), "http://h:9/dice");
        assert_eq!(cfg.default_mode, DisplayMode::Both);
        assert_eq!(cfg.max_panes, EngineConfig::default().max_panes);
    }

    #[test]
    fn rejects_missing_values_and_unknown_flags() {
        assert!(parse_args_from(args(&["--best-path"])).is_err());
        assert!(parse_args_from(args(&["--best-path", "many"])).is_err());
        assert!(parse_args_from(args(&["--mode", "x"])).is_err());
        assert!(parse_args_from(args(&["--verbose"])).is_err());
    }
}
