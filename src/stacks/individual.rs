//! SG-012: Individual CodeBuild stack.
//!
//! One per repository. Roles from the orchestrator stack arrive as
//! parameters and receive grants on the project declared here.

use crate::core::builder::{ResourceSpec, TemplateBuilder};
use crate::core::conditions::{self, Sentinel};
use crate::core::error::TemplateError;
use crate::core::policy::actions::{codebuild, ecr, kms, logs, s3, ssm};
use crate::core::policy::{self, Statement};
use crate::core::tags::{self, TAG_BUDGET};
use crate::core::trust::{Grant, Grantee};
use crate::core::types::*;

pub const DESCRIPTION: &str = "The individual CodeBuild stack for CBuildCI.";

const BUILD_IMAGE: &str = "aws/codebuild/ubuntu-base:14.04";

/// A comma-delimited list parameter that defaults to `-NONE-`, with the
/// condition that holds when it was supplied.
struct OptionalList {
    param: ParamRef,
    supplied: ConditionRef,
}

impl OptionalList {
    fn declare(
        b: &mut TemplateBuilder,
        name: &str,
        description: &str,
        condition: &str,
    ) -> Result<Self, TemplateError> {
        let param = b.add_parameter(
            Parameter::string(name)
                .description(description)
                .default(Sentinel::Unset),
        )?;
        let supplied =
            b.define_condition(condition, conditions::is_supplied(&param, Sentinel::Unset))?;
        Ok(Self { param, supplied })
    }

    fn split(&self) -> Value {
        Value::split(",", self.param.value())
    }

    /// Statement allowing `actions` on the listed ARNs, dropped when the
    /// list was not supplied.
    fn statement(&self, actions: &[&str]) -> Value {
        Value::optional(&self.supplied, Statement::allow(actions).on_value(self.split()))
    }
}

pub fn build() -> Result<Template, TemplateError> {
    let mut b = TemplateBuilder::new(DESCRIPTION);

    let build_description = b.add_parameter(
        Parameter::string("BuildDescription")
            .description("Used for the CodeBuild project description."),
    )?;
    let api_role = b.add_parameter(
        Parameter::string("ApiLambdaRole")
            .description("The IAM role used by the API lambda function, which will receive permission to monitor builds."),
    )?;
    let step_role = b.add_parameter(
        Parameter::string("StepLambdaRole")
            .description("The IAM role used by the lambda function, which will receive permission to start, stop and monitor builds."),
    )?;
    let source_bucket = b.add_parameter(Parameter::string("SourceBucket"))?;
    let source_prefix =
        b.add_parameter(Parameter::string("SourceKeyPrefix").default("github-source/"))?;
    let artifact_bucket = b.add_parameter(Parameter::string("ArtifactBucket"))?;
    let artifact_prefix =
        b.add_parameter(Parameter::string("ArtifactKeyPrefix").default("github-artifacts/"))?;
    let cache_bucket = b.add_parameter(Parameter::string("CacheBucket"))?;
    let cache_prefix =
        b.add_parameter(Parameter::string("CacheKeyPrefix").default("github-cache/"))?;
    let retention = b.add_parameter(
        Parameter::number("LogsRetentionDays")
            .description("Number of days to keep CloudWatch logs for this stack's lambda function.")
            .default(30),
    )?;

    let role_policies = OptionalList::declare(
        &mut b,
        "CodeBuildRolePolicyArns",
        "Optional list of IAM managed policy ARNs to attach to the CodeBuild role.",
        "HasCodeBuildRolePolicyArns",
    )?;
    let read_ecr = OptionalList::declare(
        &mut b,
        "ReadECRArns",
        "ECS Repository ARNs to give CodeBuild permission to pull images from.",
        "HasReadECRArns",
    )?;
    let read_s3 = OptionalList::declare(
        &mut b,
        "ReadS3Arns",
        "S3 ARNs to give CodeBuild permission to S3.",
        "HasReadS3Arns",
    )?;
    let read_ssm = OptionalList::declare(
        &mut b,
        "ReadSSMParamArns",
        "SSM parameters to give CodeBuild permission to read.",
        "HasReadSSMParamArns",
    )?;
    let read_kms = OptionalList::declare(
        &mut b,
        "ReadKMSArns",
        "KMS keys to give CodeBuild permission to decrypt.",
        "HasReadKMSArns",
    )?;
    let vpc = OptionalList::declare(
        &mut b,
        "VPC",
        "Optional VPC to use for CodeBuild.",
        "HasVPC",
    )?;
    let security_groups = b.add_parameter(
        Parameter::string("SecurityGroups")
            .description("Security groups to use for CodeBuild.")
            .default(Sentinel::Unset),
    )?;
    let subnets = b.add_parameter(
        Parameter::string("Subnets")
            .description("Subnets to use for CodeBuild.")
            .default(Sentinel::Unset),
    )?;

    let tags = tags::build_tag_list(&mut b, TAG_BUDGET)?;

    let log_group = b.declare_resource(
        "CodeBuildLogGroup",
        ResourceSpec::new(ResourceKind::LogGroup)
            .prop(
                "LogGroupName",
                Sub::new().text("/aws/codebuild/").pseudo(Pseudo::StackName),
            )
            .prop("RetentionInDays", retention.value()),
    )?;

    let statements = vec![
        Statement::allow(&[logs::CREATE_LOG_GROUP, logs::CREATE_LOG_STREAM, logs::PUT_LOG_EVENTS])
            .on([log_group.arn()])
            .into(),
        Statement::allow(&[s3::GET_OBJECT, s3::GET_OBJECT_VERSION])
            .on([policy::s3_prefix_arn(&source_bucket, &source_prefix)])
            .into(),
        Statement::allow(&[s3::GET_OBJECT, s3::GET_OBJECT_VERSION, s3::PUT_OBJECT])
            .on([
                policy::s3_prefix_arn(&artifact_bucket, &artifact_prefix),
                policy::s3_prefix_arn(&cache_bucket, &cache_prefix),
            ])
            .into(),
        read_ecr.statement(&[
            ecr::BATCH_CHECK_LAYER_AVAILABILITY,
            ecr::BATCH_GET_IMAGE,
            ecr::GET_DOWNLOAD_URL_FOR_LAYER,
        ]),
        read_s3.statement(&[s3::LIST_BUCKET, s3::GET_OBJECT, s3::GET_OBJECT_VERSION]),
        read_ssm.statement(&[ssm::GET_PARAMETER]),
        read_kms.statement(&[kms::DECRYPT]),
    ];

    let role = b.declare_resource(
        "CodeBuildRole",
        ResourceSpec::new(ResourceKind::IamRole)
            .prop(
                "AssumeRolePolicyDocument",
                policy::assume_role(Value::list(["codebuild.amazonaws.com".into()])),
            )
            .prop(
                "ManagedPolicyArns",
                Value::optional(&role_policies.supplied, role_policies.split()),
            )
            .prop(
                "Policies",
                Value::list([policy::inline("code-build-policy", statements)]),
            ),
    )?;

    let codebuild_type = |t: &str| Value::object([("Type", Value::from(t))]);
    let project = b.declare_resource(
        "CodeBuild",
        ResourceSpec::new(ResourceKind::CodeBuildProject)
            .prop("Name", Pseudo::StackName)
            .prop("Description", build_description.value())
            .prop("ServiceRole", role.reference())
            .prop("Source", codebuild_type("CODEPIPELINE"))
            .prop("Artifacts", codebuild_type("CODEPIPELINE"))
            .prop(
                "VpcConfig",
                Value::optional(
                    &vpc.supplied,
                    Value::object([
                        ("VpcId", vpc.param.value()),
                        ("Subnets", subnets.value()),
                        ("SecurityGroupIds", security_groups.value()),
                    ]),
                ),
            )
            .prop(
                "Environment",
                Value::object([
                    ("Type", Value::from("LINUX_CONTAINER")),
                    ("ComputeType", "BUILD_GENERAL1_SMALL".into()),
                    ("Image", BUILD_IMAGE.into()),
                ]),
            )
            .prop("Tags", tags),
    )?;

    let policy_name = || Sub::new().pseudo(Pseudo::StackName).text("-policy");

    // The API only monitors builds.
    Grant::new()
        .id("ApiLambdaRolePolicy")
        .policy_name(policy_name())
        .to(Grantee::External(&api_role))
        .allow(&[codebuild::BATCH_GET_BUILDS], project.arn())
        .allow(&[logs::GET_LOG_EVENTS], log_group.arn())
        .declare(&mut b)?;

    Grant::new()
        .id("StepLambdaRolePolicy")
        .policy_name(policy_name())
        .to(Grantee::External(&step_role))
        .allow(
            &[
                codebuild::START_BUILD,
                codebuild::STOP_BUILD,
                codebuild::BATCH_GET_BUILDS,
            ],
            project.arn(),
        )
        .declare(&mut b)?;

    b.expose_output("CodeBuildProjectName", project.reference())?;
    b.expose_output("CodeBuildArn", project.arn())?;

    b.finish()
}
