//! SG-008: IAM policy documents, statements, action names and ARN helpers.

use super::types::{ParamRef, Pseudo, Sub, Value};

pub const POLICY_VERSION: &str = "2012-10-17";

/// Action names, grouped by service prefix.
pub mod actions {
    pub mod sts {
        pub const ASSUME_ROLE: &str = "sts:AssumeRole";
    }

    pub mod dynamodb {
        pub const GET_ITEM: &str = "dynamodb:GetItem";
        pub const BATCH_GET_ITEM: &str = "dynamodb:BatchGetItem";
        pub const PUT_ITEM: &str = "dynamodb:PutItem";
        pub const UPDATE_ITEM: &str = "dynamodb:UpdateItem";
        pub const DELETE_ITEM: &str = "dynamodb:DeleteItem";
    }

    pub mod ssm {
        pub const GET_PARAMETER: &str = "ssm:GetParameter";
        pub const PUT_PARAMETER: &str = "ssm:PutParameter";
    }

    pub mod s3 {
        pub const GET_OBJECT: &str = "s3:GetObject";
        pub const GET_OBJECT_VERSION: &str = "s3:GetObjectVersion";
        pub const PUT_OBJECT: &str = "s3:PutObject";
        pub const LIST_BUCKET: &str = "s3:ListBucket";
    }

    pub mod kms {
        pub const ENCRYPT: &str = "kms:Encrypt";
        pub const DECRYPT: &str = "kms:Decrypt";
        pub const RE_ENCRYPT: &str = "kms:ReEncrypt*";
        pub const GENERATE_DATA_KEY: &str = "kms:GenerateDataKey*";
        pub const GENERATE_DATA_KEY_WITHOUT_PLAINTEXT: &str =
            "kms:GenerateDataKeyWithoutPlaintext";
        pub const DESCRIBE_KEY: &str = "kms:DescribeKey";
        pub const TAG_RESOURCE: &str = "kms:TagResource";
        pub const UNTAG_RESOURCE: &str = "kms:UntagResource";
        pub const SCHEDULE_KEY_DELETION: &str = "kms:ScheduleKeyDeletion";
        pub const CANCEL_KEY_DELETION: &str = "kms:CancelKeyDeletion";

        /// Key administration, without the right to use the key.
        pub const ADMIN: &[&str] = &[
            "kms:Create*",
            "kms:Describe*",
            "kms:Enable*",
            "kms:List*",
            "kms:Put*",
            "kms:Update*",
            "kms:Revoke*",
            "kms:Disable*",
            "kms:Get*",
            "kms:Delete*",
            TAG_RESOURCE,
            UNTAG_RESOURCE,
            SCHEDULE_KEY_DELETION,
            CANCEL_KEY_DELETION,
        ];
    }

    pub mod logs {
        pub const CREATE_LOG_GROUP: &str = "logs:CreateLogGroup";
        pub const CREATE_LOG_STREAM: &str = "logs:CreateLogStream";
        pub const PUT_LOG_EVENTS: &str = "logs:PutLogEvents";
        pub const GET_LOG_EVENTS: &str = "logs:GetLogEvents";
    }

    pub mod states {
        pub const START_EXECUTION: &str = "states:StartExecution";
    }

    pub mod lambda {
        pub const INVOKE_FUNCTION: &str = "lambda:InvokeFunction";
    }

    pub mod ecr {
        pub const BATCH_CHECK_LAYER_AVAILABILITY: &str = "ecr:BatchCheckLayerAvailability";
        pub const BATCH_GET_IMAGE: &str = "ecr:BatchGetImage";
        pub const GET_DOWNLOAD_URL_FOR_LAYER: &str = "ecr:GetDownloadUrlForLayer";
    }

    pub mod codebuild {
        pub const START_BUILD: &str = "codebuild:StartBuild";
        pub const STOP_BUILD: &str = "codebuild:StopBuild";
        pub const BATCH_GET_BUILDS: &str = "codebuild:BatchGetBuilds";
    }
}

/// Service prefix of an action name (`kms:Decrypt` -> `kms`).
pub fn service_of(action: &str) -> &str {
    action.split_once(':').map_or(action, |(service, _)| service)
}

/// Who a statement applies to, for resource-based and trust policies.
#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    Service(Value),
    Aws(Value),
}

impl Principal {
    pub fn service(name: impl Into<Value>) -> Self {
        Self::Service(name.into())
    }

    pub fn aws(arns: impl Into<Value>) -> Self {
        Self::Aws(arns.into())
    }

    fn into_value(self) -> Value {
        match self {
            Self::Service(v) => Value::object([("Service", v)]),
            Self::Aws(v) => Value::object([("AWS", v)]),
        }
    }
}

/// One `Allow` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sid: Option<String>,
    principal: Option<Principal>,
    actions: Vec<String>,
    resource: Option<Value>,
}

impl Statement {
    pub fn allow(actions: &[&str]) -> Self {
        Self {
            sid: None,
            principal: None,
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resource: None,
        }
    }

    pub fn sid(mut self, sid: &str) -> Self {
        self.sid = Some(sid.to_string());
        self
    }

    pub fn principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Resource list.
    pub fn on(mut self, resources: impl IntoIterator<Item = Value>) -> Self {
        self.resource = Some(Value::list(resources));
        self
    }

    /// Resource given as a single value, e.g. a `Fn::Split` list.
    pub fn on_value(mut self, resource: Value) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn actions(&self) -> &[String] {
        &self.actions
    }
}

impl From<Statement> for Value {
    fn from(s: Statement) -> Self {
        let mut pairs: Vec<(&str, Value)> = Vec::new();
        if let Some(sid) = s.sid {
            pairs.push(("Sid", sid.into()));
        }
        pairs.push(("Effect", "Allow".into()));
        if let Some(p) = s.principal {
            pairs.push(("Principal", p.into_value()));
        }
        pairs.push((
            "Action",
            Value::list(s.actions.into_iter().map(Value::String)),
        ));
        if let Some(r) = s.resource {
            pairs.push(("Resource", r));
        }
        Value::object(pairs)
    }
}

/// `{"Version": "2012-10-17", "Statement": [...]}`. Entries may be
/// `Fn::If` values wrapping a statement.
pub fn document(statements: impl IntoIterator<Item = Value>) -> Value {
    Value::object([
        ("Version", Value::from(POLICY_VERSION)),
        ("Statement", Value::list(statements)),
    ])
}

/// Trust policy letting `service` assume the role.
pub fn assume_role(service: impl Into<Value>) -> Value {
    document([Statement::allow(&[actions::sts::ASSUME_ROLE])
        .principal(Principal::service(service))
        .into()])
}

/// Inline role policy entry for a role's `Policies` list.
pub fn inline(name: &str, statements: impl IntoIterator<Item = Value>) -> Value {
    Value::object([
        ("PolicyName", Value::from(name)),
        ("PolicyDocument", document(statements)),
    ])
}

/// `arn:aws:<service>:${AWS::Region}:${AWS::AccountId}:` followed by `resource`.
pub fn regional_arn(service: &str, resource: Sub) -> Sub {
    Sub::new()
        .text(&format!("arn:aws:{}:", service))
        .pseudo(Pseudo::Region)
        .text(":")
        .pseudo(Pseudo::AccountId)
        .text(":")
        .append(resource)
}

/// `arn:aws:s3:::` followed by `resource`.
pub fn s3_arn(resource: Sub) -> Sub {
    Sub::new().text("arn:aws:s3:::").append(resource)
}

pub fn table_arn(table: &ParamRef) -> Value {
    regional_arn("dynamodb", Sub::new().text("table/").param(table)).into()
}

pub fn ssm_parameter_arn(name: &ParamRef) -> Value {
    regional_arn("ssm", Sub::new().text("parameter/").param(name)).into()
}

/// Objects under `bucket`/`prefix`.
pub fn s3_prefix_arn(bucket: &ParamRef, prefix: &ParamRef) -> Value {
    s3_arn(Sub::new().param(bucket).text("/").param(prefix).text("*")).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(v: Value) -> String {
        serde_json::to_string(&v).unwrap()
    }

    #[test]
    fn test_policy_service_of() {
        assert_eq!(service_of(actions::kms::DECRYPT), "kms");
        assert_eq!(service_of(actions::states::START_EXECUTION), "states");
        assert_eq!(service_of("bare"), "bare");
    }

    #[test]
    fn test_policy_statement_key_order() {
        let s = Statement::allow(&[actions::kms::DECRYPT])
            .sid("Use")
            .principal(Principal::aws("arn:aws:iam::1:root"))
            .on([Value::from("*")]);
        assert_eq!(
            json(s.into()),
            r#"{"Sid":"Use","Effect":"Allow","Principal":{"AWS":"arn:aws:iam::1:root"},"Action":["kms:Decrypt"],"Resource":["*"]}"#
        );
    }

    #[test]
    fn test_policy_assume_role_has_no_resource() {
        assert_eq!(
            json(assume_role(Value::list([Value::from("lambda.amazonaws.com")]))),
            r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Principal":{"Service":["lambda.amazonaws.com"]},"Action":["sts:AssumeRole"]}]}"#
        );
    }

    #[test]
    fn test_policy_regional_arn() {
        let table = ParamRef::new("LocksTableName");
        assert_eq!(
            json(table_arn(&table)),
            r#"{"Fn::Sub":"arn:aws:dynamodb:${AWS::Region}:${AWS::AccountId}:table/${LocksTableName}"}"#
        );
    }

    #[test]
    fn test_policy_s3_prefix_arn() {
        let bucket = ParamRef::new("SourceBucket");
        let prefix = ParamRef::new("SourceKeyPrefix");
        assert_eq!(
            json(s3_prefix_arn(&bucket, &prefix)),
            r#"{"Fn::Sub":"arn:aws:s3:::${SourceBucket}/${SourceKeyPrefix}*"}"#
        );
    }

    #[test]
    fn test_policy_kms_admin_actions() {
        assert_eq!(actions::kms::ADMIN.len(), 14);
        assert!(actions::kms::ADMIN.iter().all(|a| service_of(a) == "kms"));
    }
}
