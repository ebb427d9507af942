use serde::Serialize;

use crate::{
    command::{BuilderCore, Command, CommandBuilder, CommandError, CommandKind, Operation},
    pb,
    validate::{self, OptionSpec, ValidationError},
};

/// Name the server substitutes when no schema is requested explicitly.
pub const DEFAULT_SCHEMA_NAME: &str = "_yz_default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Fetches a search schema definition by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSchema {
    schema_name: Option<String>,
}

impl FetchSchema {
    pub fn builder() -> FetchSchemaBuilder {
        FetchSchemaBuilder::default()
    }

    /// The name put on the wire.
    pub fn schema_name(&self) -> &str {
        self.schema_name.as_deref().unwrap_or(DEFAULT_SCHEMA_NAME)
    }
}

impl Operation for FetchSchema {
    type Request = pb::RpbYokozunaSchemaGetReq;
    type Response = pb::RpbYokozunaSchemaGetResp;
    type Output = Schema;

    const KIND: CommandKind = CommandKind::FetchSchema;
    const OPTIONS: &'static [OptionSpec] = &[OptionSpec::defaulted("schema_name", DEFAULT_SCHEMA_NAME)];

    fn construct_request(&self) -> pb::RpbYokozunaSchemaGetReq {
        pb::RpbYokozunaSchemaGetReq {
            name: Some(self.schema_name().as_bytes().to_vec()),
        }
    }

    fn decode_success(&self, response: pb::RpbYokozunaSchemaGetResp) -> Result<Schema, CommandError> {
        let schema = response
            .schema
            .ok_or_else(|| CommandError::decode("schema response carries no schema"))?;
        let name = match schema.name {
            Some(name) => String::from_utf8(name)
                .map_err(|e| CommandError::decode(format!("schema name: {e}")))?,
            None => self.schema_name().to_string(),
        };
        Ok(Schema {
            name,
            content: schema
                .content
                .map(|c| String::from_utf8_lossy(&c).into_owned()),
        })
    }
}

#[derive(Default)]
pub struct FetchSchemaBuilder {
    schema_name: Option<String>,
    core: BuilderCore<Schema>,
}

impl FetchSchemaBuilder {
    pub fn with_schema_name(mut self, name: impl Into<String>) -> Self {
        self.schema_name = Some(name.into());
        self
    }
}

impl CommandBuilder for FetchSchemaBuilder {
    type Operation = FetchSchema;

    fn core_mut(&mut self) -> &mut BuilderCore<Schema> {
        &mut self.core
    }

    fn build(mut self) -> Result<Command<FetchSchema>, ValidationError> {
        let callback = self.core.take_callback()?;
        let op = FetchSchema {
            schema_name: validate::optional_non_empty("schema_name", self.schema_name)?,
        };
        Ok(self.core.finish(callback, op))
    }
}
