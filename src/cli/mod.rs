//! SG-013: CLI subcommands: generate, validate, plan.

use crate::core::codegen::{self, Format};
use crate::core::eval::{self, Overrides};
use crate::core::{digest, lint, resolver};
use crate::stacks::{StackKind, BUNDLED_DEFINITION};
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write both stack templates to a directory
    Generate {
        /// Output directory (must exist)
        outdir: PathBuf,

        /// Output format: yaml or json
        #[arg(short, long, default_value = "yaml")]
        format: Format,

        /// State-machine definition embedded in the orchestrator stack
        /// (defaults to the bundled one)
        #[arg(short, long)]
        definition: Option<PathBuf>,
    },

    /// Build both stacks, lint them and print fingerprints
    Validate {
        /// State-machine definition embedded in the orchestrator stack
        /// (defaults to the bundled one)
        #[arg(short, long)]
        definition: Option<PathBuf>,
    },

    /// Show which resources a parameter set would create
    Plan {
        /// Stack to evaluate: orchestrator or individual
        stack: StackKind,

        /// Parameter override (repeatable)
        #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        params: Vec<(String, String)>,

        /// State-machine definition embedded in the orchestrator stack
        /// (defaults to the bundled one)
        #[arg(short, long)]
        definition: Option<PathBuf>,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Generate {
            outdir,
            format,
            definition,
        } => cmd_generate(&outdir, format, definition.as_deref()),
        Commands::Validate { definition } => cmd_validate(definition.as_deref()),
        Commands::Plan {
            stack,
            params,
            definition,
        } => cmd_plan(stack, &params, definition.as_deref()),
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

fn read_definition(path: Option<&Path>) -> Result<String, String> {
    let Some(path) = path else {
        return Ok(BUNDLED_DEFINITION.to_string());
    };
    std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read state-machine definition {}: {}", path.display(), e))
}

fn cmd_generate(outdir: &Path, format: Format, definition: Option<&Path>) -> Result<(), String> {
    if !outdir.is_dir() {
        return Err(format!("output directory {} does not exist", outdir.display()));
    }
    let definition = read_definition(definition)?;

    for kind in StackKind::ALL {
        let template = kind
            .build(&definition)
            .map_err(|e| format!("{} stack: {}", kind, e))?;
        let text = codegen::render(&template, format).map_err(|e| e.to_string())?;
        let path = outdir.join(format!("{}.{}", kind.file_stem(), format.extension()));
        std::fs::write(&path, text)
            .map_err(|e| format!("cannot write {}: {}", path.display(), e))?;
        tracing::info!(stack = %kind, path = %path.display(), "template written");
        println!("  Wrote: {}", path.display());
    }
    Ok(())
}

fn cmd_validate(definition: Option<&Path>) -> Result<(), String> {
    let definition = read_definition(definition)?;

    let mut failures = 0;
    for kind in StackKind::ALL {
        let template = match kind.build(&definition) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("  ERROR: {}: {}", kind, e);
                failures += 1;
                continue;
            }
        };
        let findings = lint::check_template(&template);
        for finding in &findings {
            tracing::warn!(stack = %kind, "{}", finding);
            eprintln!("  ERROR: {}: {}", kind, finding);
        }
        failures += findings.len();

        let fingerprint = digest::fingerprint(&template).map_err(|e| e.to_string())?;
        println!(
            "OK: {} ({} parameters, {} conditions, {} resources, {} outputs) {}",
            kind,
            template.parameters.len(),
            template.conditions.len(),
            template.resources.len(),
            template.outputs.len(),
            fingerprint
        );
    }

    if failures == 0 {
        Ok(())
    } else {
        Err(format!("{} validation error(s)", failures))
    }
}

fn cmd_plan(
    stack: StackKind,
    params: &[(String, String)],
    definition: Option<&Path>,
) -> Result<(), String> {
    // The individual stack does not embed the definition.
    let definition = match stack {
        StackKind::Orchestrator => read_definition(definition)?,
        StackKind::Individual => String::new(),
    };
    let template = stack.build(&definition).map_err(|e| e.to_string())?;
    let order = resolver::build_order(&template).map_err(|e| e.to_string())?;

    let overrides: Overrides = params.iter().cloned().collect();
    let plan = eval::evaluate(&template, &overrides).map_err(|e| e.to_string())?;

    println!("Planning: {} ({} resources)", stack, order.len());
    println!();
    for id in &order {
        let Some(decision) = plan.decisions.iter().find(|d| &d.logical_id == id) else {
            continue;
        };
        let symbol = if decision.created { "+" } else { "-" };
        match &decision.condition {
            Some(cond) => println!("  {} {} ({}) [{}]", symbol, id, decision.kind, cond),
            None => println!("  {} {} ({})", symbol, id, decision.kind),
        }
    }

    println!();
    println!(
        "Plan: {} to create, {} skipped.",
        plan.created().count(),
        plan.skipped().count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(dir: &Path) -> PathBuf {
        let path = dir.join("definition.json");
        std::fs::write(
            &path,
            r#"{"StartAt":"Execute","States":{"Execute":{"Type":"Task","Resource":"${StepLambdaArn}","End":true}}}"#,
        )
        .unwrap();
        path
    }

    #[test]
    fn test_cli_parse_key_val() {
        assert_eq!(
            parse_key_val("SecretsKMSArn=arn:aws:kms:x").unwrap(),
            ("SecretsKMSArn".to_string(), "arn:aws:kms:x".to_string())
        );
        assert_eq!(
            parse_key_val("Tag1Value=a=b").unwrap(),
            ("Tag1Value".to_string(), "a=b".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn test_cli_generate_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let def = definition(dir.path());
        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        cmd_generate(&out, Format::Yaml, Some(&def)).unwrap();

        let text = std::fs::read_to_string(out.join("orchestrator.yaml")).unwrap();
        let parsed: serde_yaml_ng::Value = serde_yaml_ng::from_str(&text).unwrap();
        assert_eq!(
            parsed["Description"],
            serde_yaml_ng::Value::String("The orchestrator stack for CBuildCI.".into())
        );
        assert!(out.join("individual-codebuild.yaml").exists());
    }

    #[test]
    fn test_cli_generate_json() {
        let dir = tempfile::tempdir().unwrap();
        let def = definition(dir.path());
        cmd_generate(dir.path(), Format::Json, Some(&def)).unwrap();

        let text = std::fs::read_to_string(dir.path().join("individual-codebuild.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["AWSTemplateFormatVersion"], "2010-09-09");
        assert!(parsed["Resources"]["CodeBuild"].is_object());
        assert!(dir.path().join("orchestrator.json").exists());
    }

    #[test]
    fn test_cli_generate_is_byte_stable() {
        let dir = tempfile::tempdir().unwrap();
        let def = definition(dir.path());
        let first = dir.path().join("a");
        let second = dir.path().join("b");
        std::fs::create_dir_all(&first).unwrap();
        std::fs::create_dir_all(&second).unwrap();
        cmd_generate(&first, Format::Json, Some(&def)).unwrap();
        cmd_generate(&second, Format::Json, Some(&def)).unwrap();
        assert_eq!(
            std::fs::read(first.join("orchestrator.json")).unwrap(),
            std::fs::read(second.join("orchestrator.json")).unwrap()
        );
    }

    #[test]
    fn test_cli_generate_missing_outdir() {
        let dir = tempfile::tempdir().unwrap();
        let def = definition(dir.path());
        let err = cmd_generate(&dir.path().join("nope"), Format::Yaml, Some(&def)).unwrap_err();
        assert!(err.contains("does not exist"));
    }

    #[test]
    fn test_cli_generate_bundled_definition() {
        let dir = tempfile::tempdir().unwrap();
        cmd_generate(dir.path(), Format::Json, None).unwrap();

        let text = std::fs::read_to_string(dir.path().join("orchestrator.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        let body = &parsed["Resources"]["BuildStateMachine"]["Properties"]["DefinitionString"]["Fn::Sub"][0];
        assert_eq!(body.as_str().unwrap(), BUNDLED_DEFINITION);
    }

    #[test]
    fn test_cli_validate_bundled_definition() {
        cmd_validate(None).unwrap();
        cmd_plan(StackKind::Orchestrator, &[], None).unwrap();
    }

    #[test]
    fn test_cli_missing_definition() {
        let dir = tempfile::tempdir().unwrap();
        let err = cmd_validate(Some(&dir.path().join("missing.json"))).unwrap_err();
        assert!(err.contains("cannot read state-machine definition"));
    }

    #[test]
    fn test_cli_validate_ok() {
        let dir = tempfile::tempdir().unwrap();
        cmd_validate(Some(&definition(dir.path()))).unwrap();
    }

    #[test]
    fn test_cli_plan_individual_ignores_definition() {
        let dir = tempfile::tempdir().unwrap();
        cmd_plan(StackKind::Individual, &[], Some(&dir.path().join("missing.json"))).unwrap();
    }

    #[test]
    fn test_cli_plan_reuse_key() {
        let dir = tempfile::tempdir().unwrap();
        let params = vec![(
            "SecretsKMSArn".to_string(),
            "arn:aws:kms:us-east-1:1:key/k".to_string(),
        )];
        cmd_plan(StackKind::Orchestrator, &params, Some(&definition(dir.path()))).unwrap();
    }

    #[test]
    fn test_cli_plan_unknown_param() {
        let dir = tempfile::tempdir().unwrap();
        let params = vec![("Bogus".to_string(), "x".to_string())];
        let err = cmd_plan(StackKind::Individual, &params, Some(dir.path())).unwrap_err();
        assert!(err.contains("Bogus"));
    }

    #[test]
    fn test_cli_plan_disallowed_value() {
        let dir = tempfile::tempdir().unwrap();
        let params = vec![("GitHubUseChecks".to_string(), "maybe".to_string())];
        let err = cmd_plan(StackKind::Orchestrator, &params, Some(&definition(dir.path()))).unwrap_err();
        assert!(err.contains("GitHubUseChecks"));
    }
}
