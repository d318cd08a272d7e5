//! Function table: operation name -> handler plus parameter schema.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use crate::artifact::{Image, Secret, Service};
use crate::context::ForgeContext;
use crate::error::{ForgeError, Result};
use crate::source::{SourceDir, PIPELINE_DIR};
use crate::stages;

/// Kind of value a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Directory,
    Secret,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::Directory => f.write_str("directory"),
            ParamKind::Secret => f.write_str("secret"),
        }
    }
}

/// Declared parameter of a function.
#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
    pub optional: bool,
    /// Workspace-relative directory used when the argument is omitted.
    pub default_path: Option<&'static str>,
    /// Top-level entries hidden from a directory argument.
    pub ignore: &'static [&'static str],
}

const SOURCE_IGNORE: &[&str] = &[PIPELINE_DIR];

const SRC_PARAM: ParamSpec = ParamSpec {
    name: "src",
    kind: ParamKind::Directory,
    description: "Project source tree",
    optional: false,
    default_path: Some("/"),
    ignore: SOURCE_IGNORE,
};

const TOKEN_PARAM: ParamSpec = ParamSpec {
    name: "token",
    kind: ParamKind::Secret,
    description: "Vault token; when present the image is published",
    optional: true,
    default_path: None,
    ignore: &[],
};

/// A supplied argument value.
#[derive(Debug, Clone)]
pub enum ArgValue {
    Directory(PathBuf),
    Secret(Secret),
}

impl ArgValue {
    fn kind(&self) -> ParamKind {
        match self {
            ArgValue::Directory(_) => ParamKind::Directory,
            ArgValue::Secret(_) => ParamKind::Secret,
        }
    }
}

/// Resolved, schema-checked arguments handed to a handler.
#[derive(Debug, Default)]
pub struct Invocation {
    function: String,
    directories: BTreeMap<String, SourceDir>,
    secrets: BTreeMap<String, Secret>,
}

impl Invocation {
    pub fn directory(&self, name: &str) -> Result<&SourceDir> {
        self.directories
            .get(name)
            .ok_or_else(|| ForgeError::MissingArgument {
                function: self.function.clone(),
                param: name.to_string(),
            })
    }

    pub fn secret(&self, name: &str) -> Option<&Secret> {
        self.secrets.get(name)
    }
}

/// What a function returns to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FunctionOutput {
    Unit,
    Image(Image),
    Service(Service),
}

pub type Handler = fn(ForgeContext, Invocation) -> BoxFuture<'static, Result<FunctionOutput>>;

/// A registered function.
#[derive(Clone, Serialize)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
    #[serde(skip)]
    pub handler: Handler,
}

/// Registered functions, keyed by name.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<&'static str, FunctionSpec>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The score-server pipeline: `test`, `docker` and `service`.
    pub fn score_server() -> Self {
        let mut registry = Self::new();
        registry.register(FunctionSpec {
            name: "test",
            description: "Test the score-server project using go vet",
            params: vec![SRC_PARAM],
            handler: call_test,
        });
        registry.register(FunctionSpec {
            name: "docker",
            description: "Build and optionally publish a Docker image for the score-server package",
            params: vec![SRC_PARAM, TOKEN_PARAM],
            handler: call_docker,
        });
        registry.register(FunctionSpec {
            name: "service",
            description: "Run the score-server project as a service",
            params: vec![SRC_PARAM],
            handler: call_service,
        });
        registry
    }

    /// Add or replace a function.
    pub fn register(&mut self, spec: FunctionSpec) {
        self.functions.insert(spec.name, spec);
    }

    pub fn get(&self, name: &str) -> Option<&FunctionSpec> {
        self.functions.get(name)
    }

    /// Functions in name order.
    pub fn functions(&self) -> impl Iterator<Item = &FunctionSpec> {
        self.functions.values()
    }

    /// Check `args` against the schema and run the handler.
    pub async fn call(
        &self,
        name: &str,
        ctx: ForgeContext,
        mut args: BTreeMap<String, ArgValue>,
    ) -> Result<FunctionOutput> {
        let spec = self
            .get(name)
            .ok_or_else(|| ForgeError::UnknownFunction(name.to_string()))?;

        if let Some(extra) = args.keys().find(|k| !spec.params.iter().any(|p| p.name == k.as_str())) {
            return Err(ForgeError::UnexpectedArgument {
                function: spec.name.to_string(),
                param: extra.clone(),
            });
        }

        let mut invocation = Invocation {
            function: spec.name.to_string(),
            ..Invocation::default()
        };

        for param in &spec.params {
            match (args.remove(param.name), param.kind) {
                (Some(ArgValue::Directory(path)), ParamKind::Directory) => {
                    let src = source_dir(&ctx, path, param);
                    invocation.directories.insert(param.name.to_string(), src);
                }
                (Some(ArgValue::Secret(secret)), ParamKind::Secret) => {
                    invocation.secrets.insert(param.name.to_string(), secret);
                }
                (Some(other), expected) => {
                    return Err(ForgeError::InvalidArgument {
                        function: spec.name.to_string(),
                        param: format!("{} ({} given)", param.name, other.kind()),
                        expected: expected.to_string(),
                    });
                }
                (None, ParamKind::Directory) if param.default_path.is_some() => {
                    let default = param.default_path.unwrap_or("/").trim_start_matches('/');
                    let src = source_dir(&ctx, PathBuf::from(default), param);
                    invocation.directories.insert(param.name.to_string(), src);
                }
                (None, _) if param.optional => {}
                (None, _) => {
                    return Err(ForgeError::MissingArgument {
                        function: spec.name.to_string(),
                        param: param.name.to_string(),
                    });
                }
            }
        }

        for src in invocation.directories.values() {
            match src.digest() {
                Ok(digest) => info!(function = spec.name, src = %src.root().display(), digest = %digest, "Source snapshot"),
                Err(e) => warn!(function = spec.name, src = %src.root().display(), error = %e, "Could not digest source snapshot"),
            }
        }

        let span = info_span!("function", name = spec.name);
        (spec.handler)(ctx, invocation).instrument(span).await
    }
}

/// Resolve a directory argument against the workspace root.
fn source_dir(ctx: &ForgeContext, path: PathBuf, param: &ParamSpec) -> SourceDir {
    let root = ctx.workspace_root().join(path);
    SourceDir::with_ignore(root, param.ignore.iter().map(|s| s.to_string()).collect())
}

fn call_test(ctx: ForgeContext, args: Invocation) -> BoxFuture<'static, Result<FunctionOutput>> {
    Box::pin(async move {
        stages::test(&ctx, args.directory("src")?).await?;
        Ok(FunctionOutput::Unit)
    })
}

fn call_docker(ctx: ForgeContext, args: Invocation) -> BoxFuture<'static, Result<FunctionOutput>> {
    Box::pin(async move {
        let image = stages::docker(&ctx, args.directory("src")?, args.secret("token")).await?;
        Ok(FunctionOutput::Image(image))
    })
}

fn call_service(ctx: ForgeContext, args: Invocation) -> BoxFuture<'static, Result<FunctionOutput>> {
    Box::pin(async move {
        let service = stages::service(&ctx, args.directory("src")?).await?;
        Ok(FunctionOutput::Service(service))
    })
}
