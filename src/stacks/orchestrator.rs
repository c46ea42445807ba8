//! SG-012: Orchestrator (control plane) stack.
//!
//! Three lambda functions behind an API Gateway, a Step Functions state
//! machine driving builds, and a KMS key for secrets that is either created
//! here or supplied by ARN.

use crate::core::builder::{CreateOrReuse, ResourceSpec, TemplateBuilder};
use crate::core::conditions::{self, Sentinel};
use crate::core::error::TemplateError;
use crate::core::policy::actions::{dynamodb, kms, lambda, logs, s3, ssm, states};
use crate::core::policy::{self, Principal, Statement};
use crate::core::tags::{self, TAG_BUDGET};
use crate::core::trust::{self, Grant, Grantee};
use crate::core::types::*;

pub const DESCRIPTION: &str = "The orchestrator stack for CBuildCI.";

const LAMBDA_RUNTIME: &str = "nodejs8.10";
const LAMBDA_MEMORY_MB: i64 = 128;
const LAMBDA_TIMEOUT_SECONDS: i64 = 60;

/// What every lambda role may do with the secrets key.
const KMS_ACTIONS: &[&str] = &[kms::ENCRYPT, kms::DECRYPT];

/// Variable the state-machine definition uses for the step lambda's ARN.
pub const STEP_LAMBDA_ARN_VAR: &str = "StepLambdaArn";

struct Params {
    base_url: ParamRef,
    kms_arn: ParamRef,
    kms_alias: ParamRef,
    kms_user_arns: ParamRef,
    kms_admin_arns: ParamRef,
    config_table: ParamRef,
    locks_table: ParamRef,
    sessions_table: ParamRef,
    executions_table: ParamRef,
    artifact_bucket: ParamRef,
    app_static_prefix: ParamRef,
    artifact_prefix: ParamRef,
    source_prefix: ParamRef,
    github_url: ParamRef,
    github_api_url: ParamRef,
    github_app_id: ParamRef,
    github_client_id: ParamRef,
    github_client_secret: ParamRef,
    github_webhook_secret: ParamRef,
    github_private_key: ParamRef,
    github_use_checks: ParamRef,
    session_secrets: ParamRef,
    logs_retention_days: ParamRef,
    lambda_zip_bucket: ParamRef,
    lambda_zip_key: ParamRef,
    wait_seconds_default: ParamRef,
    lock_timeout_seconds: ParamRef,
    max_session_minutes: ParamRef,
    builds_yml_file: ParamRef,
}

fn declare_params(b: &mut TemplateBuilder) -> Result<Params, TemplateError> {
    Ok(Params {
        base_url: b.add_parameter(
            Parameter::string("BaseUrl")
                .description("The base URL of the application, e.g. \"https://cbuildci.mycompany.com/\""),
        )?,
        kms_arn: b.add_parameter(
            Parameter::string("SecretsKMSArn")
                .description("Set to \"-CREATE-\" (default) to create a new KMS key (default), or enter the ARN of an existing key to use.")
                .default(Sentinel::Create),
        )?,
        kms_alias: b.add_parameter(
            Parameter::string("SecretsKMSAlias")
                .description("If SecretsKMSArn is set to \"-CREATE-\", the alias for KMS key. Defaults to \"${AWS::StackName}-kms-key\"")
                .default(Sentinel::Default),
        )?,
        kms_user_arns: b.add_parameter(
            Parameter::string("SecretsKMSUserArns")
                .description("If SecretsKMSArn is set to \"-CREATE-\", IAM User or role ARNs will have \"user\" access to the KMS key.")
                .default(Sentinel::Unset),
        )?,
        kms_admin_arns: b.add_parameter(
            Parameter::string("SecretsKMSAdminArns")
                .description("If SecretsKMSArn is set to \"-CREATE-\", IAM User or role ARNs will have \"admin\" access to the KMS key.")
                .default(Sentinel::RequiredIfCreate),
        )?,
        config_table: b.add_parameter(Parameter::string("ConfigTableName"))?,
        locks_table: b.add_parameter(Parameter::string("LocksTableName"))?,
        sessions_table: b.add_parameter(Parameter::string("SessionsTableName"))?,
        executions_table: b.add_parameter(Parameter::string("ExecutionsTableName"))?,
        artifact_bucket: b.add_parameter(Parameter::string("ArtifactBucketName"))?,
        app_static_prefix: b.add_parameter(
            Parameter::string("AppStaticKeyPrefix")
                .description("Path prefix where the static UI application resources will be stored.")
                .default("github-app-static/"),
        )?,
        artifact_prefix: b.add_parameter(
            Parameter::string("ArtifactKeyPrefix")
                .description("Path prefix for storing artifacts in the artifact bucket.")
                .default("github-artifacts/"),
        )?,
        source_prefix: b.add_parameter(
            Parameter::string("SourceKeyPrefix")
                .description("Path prefix for source zips in the artifact bucket.")
                .default("github-source/"),
        )?,
        github_url: b.add_parameter(Parameter::string("GitHubUrl").default("https://github.com/"))?,
        github_api_url: b.add_parameter(
            Parameter::string("GitHubApiUrl").default("https://api.github.com/"),
        )?,
        github_app_id: b.add_parameter(
            Parameter::string("GitHubAppId").description("The client ID number of the GitHub App"),
        )?,
        github_client_id: b.add_parameter(
            Parameter::string("GitHubOAuthClientId")
                .description("The OAuth client ID for the GitHub App."),
        )?,
        github_client_secret: b.add_parameter(
            Parameter::string("GitHubClientSecretParamName")
                .description("SSM parameter that stores the GitHub App OAuth client secret."),
        )?,
        github_webhook_secret: b.add_parameter(
            Parameter::string("GitHubWebhookSecretParamName")
                .description("SSM parameter that stores the GitHub App webhook secret for HMAC validation."),
        )?,
        github_private_key: b.add_parameter(
            Parameter::string("GitHubAppPrivateKeyParamName")
                .description("SSM parameter that stores the GitHub App private key."),
        )?,
        github_use_checks: b.add_parameter(
            Parameter::string("GitHubUseChecks")
                .description("Set to false to disable the use of GitHub Checks. See https://developer.github.com/v3/checks/")
                .allowed(&["true", "false"])
                .default("true"),
        )?,
        session_secrets: b.add_parameter(
            Parameter::string("SessionSecretsParamName")
                .description("Comma delimited list of secrets used to sign session cookies."),
        )?,
        logs_retention_days: b.add_parameter(
            Parameter::number("LogsRetentionDays")
                .description("Number of days to keep CloudWatch logs for this stack's lambda function.")
                .default(30),
        )?,
        lambda_zip_bucket: b.add_parameter(
            Parameter::string("LambdaZipS3Bucket")
                .description("S3 bucket name where this stack's lambda code is stored as a zip file."),
        )?,
        lambda_zip_key: b.add_parameter(
            Parameter::string("LambdaZipS3Key")
                .description("Object key in LambdaZipS3Bucket for this stack's lambda code."),
        )?,
        wait_seconds_default: b.add_parameter(
            Parameter::number("WaitSecondsDefault")
                .description("Default number of seconds to wait between checking the status of running builds.")
                .default(30)
                .min(10)
                .max(120),
        )?,
        lock_timeout_seconds: b.add_parameter(
            Parameter::number("LockTimeoutSeconds")
                .description("Number of seconds until an orphaned execution lock will expired. Must not be less than WaitSecondsDefault x 2.")
                .default(300)
                .min(60),
        )?,
        max_session_minutes: b.add_parameter(
            Parameter::number("MaxSessionMinutes")
                .description("Number of minutes until a login session expires.")
                .default(30)
                .min(10),
        )?,
        builds_yml_file: b.add_parameter(
            Parameter::string("BuildsYmlFile")
                .description("The path to the file in the repo that contains the build configuration.")
                .default(".cbuildci.yml"),
        )?,
    })
}

/// Assemble the orchestrator template. `definition` is the state-machine
/// definition, embedded verbatim.
pub fn build(definition: &str) -> Result<Template, TemplateError> {
    let mut b = TemplateBuilder::new(DESCRIPTION);
    let p = declare_params(&mut b)?;

    let create_key = b.define_create_switch("DoCreateKMSKey", &p.kms_arn, Sentinel::Create)?;
    let default_alias = b.define_condition(
        "UseDefaultAliasName",
        conditions::equals_sentinel(&p.kms_alias, Sentinel::Default),
    )?;
    let has_kms_users = b.define_condition(
        "HasKMSUserArns",
        conditions::is_supplied(&p.kms_user_arns, Sentinel::Unset),
    )?;
    let tags = tags::build_tag_list(&mut b, TAG_BUDGET)?;

    // Roles
    let webhook_role = lambda_role(
        &mut b,
        "WebhookLambdaRole",
        vec![
            read_tables(&[&p.config_table, &p.locks_table, &p.executions_table]),
            write_tables(
                &[&p.locks_table, &p.executions_table],
                &[dynamodb::PUT_ITEM, dynamodb::UPDATE_ITEM, dynamodb::DELETE_ITEM],
            ),
            Statement::allow(&[ssm::GET_PARAMETER])
                .on([
                    policy::ssm_parameter_arn(&p.github_webhook_secret),
                    policy::ssm_parameter_arn(&p.github_private_key),
                ])
                .into(),
        ],
    )?;

    // The general API has no read access to unencrypted secrets.
    let api_role = lambda_role(
        &mut b,
        "ApiLambdaRole",
        vec![
            read_tables(&[
                &p.config_table,
                &p.locks_table,
                &p.sessions_table,
                &p.executions_table,
            ]),
            write_tables(
                &[&p.locks_table, &p.sessions_table, &p.executions_table],
                &[dynamodb::UPDATE_ITEM, dynamodb::DELETE_ITEM],
            ),
            Statement::allow(&[ssm::GET_PARAMETER, ssm::PUT_PARAMETER])
                .on([
                    policy::ssm_parameter_arn(&p.github_client_secret),
                    policy::ssm_parameter_arn(&p.session_secrets),
                ])
                .into(),
            Statement::allow(&[ssm::PUT_PARAMETER])
                .on([
                    policy::ssm_parameter_arn(&p.github_webhook_secret),
                    policy::ssm_parameter_arn(&p.github_private_key),
                ])
                .into(),
        ],
    )?;

    let step_role = lambda_role(
        &mut b,
        "StepLambdaRole",
        vec![
            read_tables(&[&p.locks_table, &p.executions_table]),
            write_tables(
                &[&p.locks_table, &p.executions_table],
                &[dynamodb::PUT_ITEM, dynamodb::UPDATE_ITEM, dynamodb::DELETE_ITEM],
            ),
            Statement::allow(&[s3::GET_OBJECT, s3::GET_OBJECT_VERSION, s3::PUT_OBJECT])
                .on([policy::s3_arn(Sub::new().param(&p.artifact_bucket).text("/*")).into()])
                .into(),
            Statement::allow(&[ssm::GET_PARAMETER])
                .on([policy::ssm_parameter_arn(&p.github_private_key)])
                .into(),
        ],
    )?;

    // Secrets key
    let role_statements = [
        ("WebhookLambda", &webhook_role),
        ("StepLambda", &step_role),
        ("ApiLambda", &api_role),
    ]
    .into_iter()
    .map(|(function, role)| -> Value {
        Statement::allow(KMS_ACTIONS)
            .sid(&format!("Grant actions to {}", function))
            .principal(Principal::aws(role.arn()))
            .on(["*".into()])
            .into()
    });
    let key_policy = policy::document(
        [
            Value::optional(
                &has_kms_users,
                Statement::allow(&[
                    kms::ENCRYPT,
                    kms::DECRYPT,
                    kms::RE_ENCRYPT,
                    kms::GENERATE_DATA_KEY,
                    kms::GENERATE_DATA_KEY_WITHOUT_PLAINTEXT,
                    kms::DESCRIBE_KEY,
                ])
                .sid("Allow use of the key")
                .principal(Principal::aws(Value::split(",", p.kms_user_arns.value())))
                .on(["*".into()]),
            ),
            Statement::allow(kms::ADMIN)
                .sid("Allow access for Key Administrators")
                .principal(Principal::aws(Value::split(",", p.kms_admin_arns.value())))
                .on(["*".into()])
                .into(),
        ]
        .into_iter()
        .chain(role_statements),
    );

    let key = b.create_or_reuse(
        &create_key,
        "SecretsKMSKey",
        ResourceSpec::new(ResourceKind::KmsKey)
            .deletion_policy(DeletionPolicy::Retain)
            .prop(
                "Description",
                Sub::new()
                    .text("Encrypts secrets (e.g. private keys) for the CBuildCI stack \"")
                    .pseudo(Pseudo::StackName)
                    .text("\""),
            )
            .prop("KeyPolicy", key_policy)
            .prop("Tags", tags.clone()),
    )?;

    let alias = b.declare_dependent(&key, "SecretsKMSKeyAlias", |created| {
        ResourceSpec::new(ResourceKind::KmsAlias)
            .prop(
                "AliasName",
                Value::when(
                    &default_alias,
                    Sub::new()
                        .text("alias/")
                        .pseudo(Pseudo::StackName)
                        .text("-kms-key"),
                    Sub::new().text("alias/").param(&p.kms_alias),
                ),
            )
            .prop("TargetKeyId", created.reference())
    })?;

    let key_arn = kms_key_arn(&key);
    for role in [&webhook_role, &step_role, &api_role] {
        trust::grant_cross_access(&mut b, Grantee::Role(role), key_arn.clone(), KMS_ACTIONS)?;
    }

    // Functions
    let env = lambda_environment(&p, key_arn);
    let code = Value::object([
        ("S3Bucket", p.lambda_zip_bucket.value()),
        ("S3Key", p.lambda_zip_key.value()),
    ]);
    let function = |b: &mut TemplateBuilder, id: &str, description: &str, handler: &str, role: &ResourceRef| {
        b.declare_resource(
            id,
            ResourceSpec::new(ResourceKind::LambdaFunction)
                .prop("Description", description)
                .prop("Code", code.clone())
                .prop("Handler", handler)
                .prop("MemorySize", LAMBDA_MEMORY_MB)
                .prop("Role", role.arn())
                .prop("Runtime", LAMBDA_RUNTIME)
                .prop("Timeout", LAMBDA_TIMEOUT_SECONDS)
                .prop("Environment", Value::object([("Variables", env.clone())]))
                .prop("Tags", tags.clone()),
        )
    };
    let webhook_fn = function(
        &mut b,
        "WebhookLambda",
        "Handles webhook API requests",
        "src/lambda/webhook/index.handler",
        &webhook_role,
    )?;
    let api_fn = function(
        &mut b,
        "ApiLambda",
        "Handles general API requests",
        "src/lambda/api/index.handler",
        &api_role,
    )?;
    let step_fn = function(
        &mut b,
        "StepLambda",
        "Manages the execution of CodeBuilds for a commit",
        "src/lambda/execution/index.handler",
        &step_role,
    )?;

    for (f, role) in [(&webhook_fn, &webhook_role), (&api_fn, &api_role), (&step_fn, &step_role)] {
        lambda_log_group(&mut b, f, role, &p.logs_retention_days)?;
    }

    // State machine
    let machine_role = b.declare_resource(
        "StateMachineExecutionRole",
        ResourceSpec::new(ResourceKind::IamRole)
            .prop("Path", "/service-role/")
            .prop(
                "AssumeRolePolicyDocument",
                policy::assume_role(
                    Sub::new()
                        .text("states.")
                        .pseudo(Pseudo::Region)
                        .text(".amazonaws.com"),
                ),
            )
            .prop(
                "Policies",
                Value::list([policy::inline(
                    "states-execution-policy",
                    [Statement::allow(&[lambda::INVOKE_FUNCTION])
                        .on([step_fn.arn()])
                        .into()],
                )]),
            ),
    )?;

    let machine = b.declare_resource(
        "BuildStateMachine",
        ResourceSpec::new(ResourceKind::StateMachine)
            .prop(
                "StateMachineName",
                Sub::new().pseudo(Pseudo::StackName).text("-statemachine"),
            )
            .prop("RoleArn", machine_role.arn())
            .prop(
                "DefinitionString",
                Value::sub_with(definition, [(STEP_LAMBDA_ARN_VAR, step_fn.arn())]),
            ),
    )?;

    // Allow the API to start step functions.
    Grant::new()
        .id("StepLambdaStateMachinePolicy")
        .policy_name(Sub::new().attr(&machine, "Name").text("-policy"))
        .to(Grantee::Role(&webhook_role))
        .to(Grantee::Role(&api_role))
        .allow(&[states::START_EXECUTION], machine.reference())
        .declare(&mut b)?;

    // API Gateway
    let static_role = b.declare_resource(
        "ApiGatewayAppStaticS3Role",
        ResourceSpec::new(ResourceKind::IamRole)
            .prop("Path", "/service-role/")
            .prop("AssumeRolePolicyDocument", policy::assume_role("apigateway.amazonaws.com"))
            .prop(
                "Policies",
                Value::list([policy::inline(
                    "s3-read-static-resources-policy",
                    [Statement::allow(&[s3::GET_OBJECT])
                        .on([policy::s3_prefix_arn(&p.artifact_bucket, &p.app_static_prefix)])
                        .into()],
                )]),
            ),
    )?;

    let api = b.declare_resource(
        "RestApi",
        ResourceSpec::new(ResourceKind::RestApi)
            .depends_on(&api_fn)
            .depends_on(&static_role)
            .depends_on(&webhook_fn)
            .prop("Name", Sub::new().pseudo(Pseudo::StackName).text("-api")),
    )?;

    let statics = StaticSite {
        api: &api,
        role: &static_role,
        bucket: &p.artifact_bucket,
        prefix: &p.app_static_prefix,
    };
    statics.method(&mut b, "AppGetMethod", api.attr("RootResourceId"), "index.html", false)?;
    let app = api_resource(&mut b, "AppResource", &api, api.attr("RootResourceId"), "static")?;
    let app_proxy = api_resource(&mut b, "AppProxyResource", &api, app.reference(), "{item}")?;
    statics.method(&mut b, "AppProxyMethod", app_proxy.reference(), "{object}", true)?;

    lambda_route(&mut b, "Webhook", "webhook", &api, &webhook_fn)?;
    lambda_route(&mut b, "Api", "api", &api, &api_fn)?;

    // Outputs
    b.expose_output("SecretsKMSArn", kms_key_arn(&key))?;
    b.expose_output("SecretsKMSAlias", alias.resolve_or(|a| a.reference(), "N/A"))?;
    b.expose_output("RestApiId", api.reference())?;
    b.expose_output("BuildStateMachine", machine.reference())?;
    for r in [&webhook_fn, &webhook_role, &api_fn, &api_role, &step_fn, &step_role] {
        b.expose_output(r.logical_id(), r.reference())?;
    }

    b.finish()
}

/// `arn:aws:kms:<region>:<account>:key/<id>` when created here, otherwise
/// the supplied ARN.
fn kms_key_arn(key: &CreateOrReuse) -> Value {
    key.resolve(|created| {
        policy::regional_arn("kms", Sub::new().text("key/").resource(created)).into()
    })
}

fn lambda_role(
    b: &mut TemplateBuilder,
    id: &str,
    statements: Vec<Value>,
) -> Result<ResourceRef, TemplateError> {
    b.declare_resource(
        id,
        ResourceSpec::new(ResourceKind::IamRole)
            .prop("Path", "/service-role/")
            .prop(
                "AssumeRolePolicyDocument",
                policy::assume_role(Value::list(["lambda.amazonaws.com".into()])),
            )
            .prop(
                "Policies",
                Value::list([policy::inline("lambda-policy", statements)]),
            ),
    )
}

fn read_tables(tables: &[&ParamRef]) -> Value {
    write_tables(tables, &[dynamodb::GET_ITEM, dynamodb::BATCH_GET_ITEM])
}

fn write_tables(tables: &[&ParamRef], actions: &[&str]) -> Value {
    Statement::allow(actions)
        .on(tables.iter().map(|t| policy::table_arn(t)))
        .into()
}

fn lambda_environment(p: &Params, kms_arn: Value) -> Value {
    let key_prefix = |prefix: &ParamRef| -> Value {
        Sub::new()
            .param(prefix)
            .text("{GitHubDomain}/{GitHubUser}/{GitHubRepo}/")
            .into()
    };
    Value::object([
        ("LOCK_TIMEOUT_SECONDS", p.lock_timeout_seconds.value()),
        ("MAX_SESSION_MINUTES", p.max_session_minutes.value()),
        ("BUILDS_YML_FILE", p.builds_yml_file.value()),
        ("BASE_URL", p.base_url.value()),
        ("TABLE_CONFIG_NAME", p.config_table.value()),
        ("TABLE_LOCKS_NAME", p.locks_table.value()),
        ("TABLE_SESSIONS_NAME", p.sessions_table.value()),
        ("TABLE_EXECUTIONS_NAME", p.executions_table.value()),
        (
            "STATE_MACHINE_ARN",
            policy::regional_arn(
                "states",
                Sub::new()
                    .text("stateMachine:")
                    .pseudo(Pseudo::StackName)
                    .text("-statemachine"),
            )
            .into(),
        ),
        ("STATE_MACHINE_WAIT_SECONDS_DEFAULT", p.wait_seconds_default.value()),
        ("SOURCE_S3_BUCKET_DEFAULT", p.artifact_bucket.value()),
        ("SOURCE_S3_KEY_PREFIX_DEFAULT", key_prefix(&p.source_prefix)),
        ("ARTIFACT_S3_BUCKET_DEFAULT", p.artifact_bucket.value()),
        ("ARTIFACT_S3_KEY_PREFIX_DEFAULT", key_prefix(&p.artifact_prefix)),
        ("GH_URL", p.github_url.value()),
        ("GH_API_URL", p.github_api_url.value()),
        ("GH_APP_ID", p.github_app_id.value()),
        ("GH_APP_CLIENT_ID", p.github_client_id.value()),
        ("GH_APP_CLIENT_SECRET_PARAM_NAME", p.github_client_secret.value()),
        ("GH_APP_HMAC_SECRET_PARAM_NAME", p.github_webhook_secret.value()),
        ("GH_APP_PRIVATE_KEY_PARAM_NAME", p.github_private_key.value()),
        ("GITHUB_USE_CHECKS", p.github_use_checks.value()),
        ("SESSION_SECRETS_PARAM_NAME", p.session_secrets.value()),
        ("SECRETS_KMS_ARN", kms_arn),
    ])
}

/// `{Function}LogGroup` plus a policy letting the function's role write to it.
fn lambda_log_group(
    b: &mut TemplateBuilder,
    function: &ResourceRef,
    role: &ResourceRef,
    retention: &ParamRef,
) -> Result<ResourceRef, TemplateError> {
    let group = b.declare_resource(
        &format!("{}LogGroup", function.logical_id()),
        ResourceSpec::new(ResourceKind::LogGroup)
            .prop("LogGroupName", Sub::new().text("/aws/lambda/").resource(function))
            .prop("RetentionInDays", retention.value()),
    )?;
    Grant::new()
        .id(&format!("{}LogGroupPolicy", function.logical_id()))
        .policy_name(Sub::new().resource(role).text("-policy"))
        .to(Grantee::Role(role))
        .allow(
            &[logs::CREATE_LOG_GROUP, logs::CREATE_LOG_STREAM, logs::PUT_LOG_EVENTS],
            group.arn(),
        )
        .declare(b)?;
    Ok(group)
}

fn api_resource(
    b: &mut TemplateBuilder,
    id: &str,
    api: &ResourceRef,
    parent: Value,
    path: &str,
) -> Result<ResourceRef, TemplateError> {
    b.declare_resource(
        id,
        ResourceSpec::new(ResourceKind::ApiResource)
            .prop("RestApiId", api.reference())
            .prop("PathPart", path)
            .prop("ParentId", parent),
    )
}

/// Static UI files served straight from S3.
struct StaticSite<'a> {
    api: &'a ResourceRef,
    role: &'a ResourceRef,
    bucket: &'a ParamRef,
    prefix: &'a ParamRef,
}

impl StaticSite<'_> {
    fn method(
        &self,
        b: &mut TemplateBuilder,
        id: &str,
        resource: Value,
        object: &str,
        item_path: bool,
    ) -> Result<ResourceRef, TemplateError> {
        let content_type = "method.response.header.Content-Type";
        let uri = Sub::new()
            .text("arn:aws:apigateway:")
            .pseudo(Pseudo::Region)
            .text(":s3:path/")
            .param(self.bucket)
            .text("/")
            .param(self.prefix)
            .text(object);

        let mut integration = vec![
            ("Type", Value::from("AWS")),
            ("Credentials", self.role.arn()),
            ("IntegrationHttpMethod", "GET".into()),
            ("PassthroughBehavior", "WHEN_NO_TEMPLATES".into()),
            ("Uri", uri.into()),
        ];
        if item_path {
            integration.push((
                "RequestParameters",
                Value::object([(
                    "integration.request.path.object",
                    Value::from("method.request.path.item"),
                )]),
            ));
        }
        integration.push((
            "IntegrationResponses",
            Value::list([Value::object([
                ("StatusCode", Value::from("200")),
                (
                    "ResponseParameters",
                    Value::object([(
                        content_type,
                        Value::from("integration.response.header.Content-Type"),
                    )]),
                ),
            ])]),
        ));

        let mut spec = ResourceSpec::new(ResourceKind::ApiMethod)
            .prop("RestApiId", self.api.reference())
            .prop("ResourceId", resource)
            .prop("HttpMethod", "GET")
            .prop("AuthorizationType", "NONE");
        if item_path {
            spec = spec.prop(
                "RequestParameters",
                Value::object([("method.request.path.item", Value::from(true))]),
            );
        }
        spec = spec
            .prop(
                "MethodResponses",
                Value::list([Value::object([
                    ("StatusCode", Value::from("200")),
                    (
                        "ResponseParameters",
                        Value::object([(content_type, Value::from(true))]),
                    ),
                ])]),
            )
            .prop("Integration", Value::object(integration));
        b.declare_resource(id, spec)
    }
}

/// `/{path}/{proxy+}` routed to `function`, with the invoke permission.
fn lambda_route(
    b: &mut TemplateBuilder,
    prefix: &str,
    path: &str,
    api: &ResourceRef,
    function: &ResourceRef,
) -> Result<(), TemplateError> {
    let root = api_resource(
        b,
        &format!("{}Resource", prefix),
        api,
        api.attr("RootResourceId"),
        path,
    )?;
    let proxy = api_resource(
        b,
        &format!("{}ProxyResource", prefix),
        api,
        root.reference(),
        "{proxy+}",
    )?;
    b.declare_resource(
        &format!("{}ProxyMethod", prefix),
        ResourceSpec::new(ResourceKind::ApiMethod)
            .prop("RestApiId", api.reference())
            .prop("ResourceId", proxy.reference())
            .prop("HttpMethod", "ANY")
            .prop("AuthorizationType", "NONE")
            .prop(
                "Integration",
                Value::object([
                    ("Type", Value::from("AWS_PROXY")),
                    ("IntegrationHttpMethod", "POST".into()),
                    ("PassthroughBehavior", "WHEN_NO_TEMPLATES".into()),
                    (
                        "Uri",
                        Sub::new()
                            .text("arn:aws:apigateway:")
                            .pseudo(Pseudo::Region)
                            .text(":lambda:path/2015-03-31/functions/")
                            .attr(function, "Arn")
                            .text("/invocations")
                            .into(),
                    ),
                    (
                        "IntegrationResponses",
                        Value::list([Value::object([("StatusCode", Value::from("200"))])]),
                    ),
                ]),
            ),
    )?;
    b.declare_resource(
        &format!("{}InvokePermission", function.logical_id()),
        ResourceSpec::new(ResourceKind::LambdaPermission)
            .prop("Action", lambda::INVOKE_FUNCTION)
            .prop("Principal", "apigateway.amazonaws.com")
            .prop("FunctionName", function.arn())
            .prop(
                "SourceArn",
                policy::regional_arn(
                    "execute-api",
                    Sub::new().resource(api).text(&format!("/*/*/{}/*", path)),
                ),
            ),
    )?;
    Ok(())
}
