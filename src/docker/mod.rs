//! # Docker Extension
//!
//! Game server instances run as docker compose projects, either against the
//! local engine or the engine inside a WSL2 distro.
//!
//! ## Components
//! - **CLI**: command construction per execution mode and the command runner
//! - **Compose**: `docker-compose.yml` generation from module and instance data
//! - **Hooks**: the extension operations and their dispatcher

pub mod cli;
pub mod compose;
pub mod hooks;

pub use cli::{container_name, CommandOutput, CommandRunner, CommandSpec, DockerCli, ExecMode, TokioCommandRunner};
pub use compose::{generate_compose_yaml, DockerSection, ExtensionData, InstanceData};
pub use hooks::docker_dispatcher;
