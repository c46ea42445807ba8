//! SG-005: Template serialization to JSON and YAML.
//!
//! Both formats use the long-form intrinsic syntax (`Fn::If`, `Ref`, ...)
//! and keep declaration order, so identical inputs give identical bytes.

use super::error::TemplateError;
use super::types::Template;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Yaml,
    Json,
}

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown format '{}' (expected yaml or json)", other)),
        }
    }
}

/// Pretty-printed JSON with a trailing newline.
pub fn to_json(template: &Template) -> Result<String, TemplateError> {
    let mut out =
        serde_json::to_string_pretty(template).map_err(|e| TemplateError::Serialize(e.to_string()))?;
    out.push('\n');
    Ok(out)
}

pub fn to_yaml(template: &Template) -> Result<String, TemplateError> {
    serde_yaml_ng::to_string(template).map_err(|e| TemplateError::Serialize(e.to_string()))
}

pub fn render(template: &Template, format: Format) -> Result<String, TemplateError> {
    match format {
        Format::Yaml => to_yaml(template),
        Format::Json => to_json(template),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::{ResourceSpec, TemplateBuilder};
    use crate::core::conditions::{self, Sentinel};
    use crate::core::types::{Parameter, ResourceKind, Value};

    fn sample() -> Template {
        let mut b = TemplateBuilder::new("sample");
        let retention = b
            .add_parameter(Parameter::number("LogsRetentionDays").default(30))
            .unwrap();
        let vpc = b
            .add_parameter(Parameter::string("VPC").default(Sentinel::Unset))
            .unwrap();
        let has_vpc = b
            .define_condition("HasVPC", conditions::is_supplied(&vpc, Sentinel::Unset))
            .unwrap();
        b.declare_resource(
            "Logs",
            ResourceSpec::new(ResourceKind::LogGroup)
                .prop("RetentionInDays", retention.value())
                .prop("Vpc", Value::optional(&has_vpc, vpc.value())),
        )
        .unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn test_codegen_format_parse() {
        assert_eq!("yaml".parse::<Format>().unwrap(), Format::Yaml);
        assert_eq!("YML".parse::<Format>().unwrap(), Format::Yaml);
        assert_eq!("json".parse::<Format>().unwrap(), Format::Json);
        assert!("toml".parse::<Format>().is_err());
        assert_eq!(Format::default().extension(), "yaml");
    }

    #[test]
    fn test_codegen_json_sections_in_order() {
        let json = to_json(&sample()).unwrap();
        let positions: Vec<usize> = [
            "AWSTemplateFormatVersion",
            "Description",
            "Parameters",
            "Conditions",
            "Resources",
        ]
        .iter()
        .map(|k| json.find(&format!("\"{}\"", k)).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(!json.contains("\"Outputs\""));
        assert!(json.ends_with('\n'));
    }

    #[test]
    fn test_codegen_json_round_trips_as_json() {
        let json = to_json(&sample()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            parsed["Resources"]["Logs"]["Properties"]["Vpc"],
            serde_json::json!({"Fn::If": ["HasVPC", {"Ref": "VPC"}, {"Ref": "AWS::NoValue"}]})
        );
        assert_eq!(parsed["AWSTemplateFormatVersion"], "2010-09-09");
    }

    #[test]
    fn test_codegen_yaml_long_form() {
        let yaml = to_yaml(&sample()).unwrap();
        let parsed: serde_yaml_ng::Value = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(
            parsed["AWSTemplateFormatVersion"],
            serde_yaml_ng::Value::String("2010-09-09".into())
        );
        assert_eq!(
            parsed["Resources"]["Logs"]["Type"],
            serde_yaml_ng::Value::String("AWS::Logs::LogGroup".into())
        );
        let vpc = &parsed["Resources"]["Logs"]["Properties"]["Vpc"]["Fn::If"];
        assert_eq!(vpc[0], serde_yaml_ng::Value::String("HasVPC".into()));
        assert_eq!(
            vpc[2]["Ref"],
            serde_yaml_ng::Value::String("AWS::NoValue".into())
        );
    }

    #[test]
    fn test_codegen_deterministic() {
        assert_eq!(to_json(&sample()).unwrap(), to_json(&sample()).unwrap());
        assert_eq!(
            render(&sample(), Format::Yaml).unwrap(),
            render(&sample(), Format::Yaml).unwrap()
        );
    }
}
