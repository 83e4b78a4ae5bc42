//! Remote bootstrap hand-off.
//!
//! The orchestrator only decides *where* to connect and with which
//! credentials; the bootstrap itself is delegated to a collaborator behind
//! the [`Bootstrapper`] trait. The process-backed implementation shells out
//! to the system `ssh` client (or a `winrs`-compatible client for Windows
//! targets) through [`CommandRunner`], so tests can substitute scripted
//! fakes.

use std::ffi::OsString;
use std::process::Command;
use std::str::FromStr;

use shell_escape::unix::escape;
use thiserror::Error;

use crate::config::EffectiveConfig;
use crate::gateway::ProvisionedServer;
use crate::launch::{ConnectAttribute, Platform, UnknownOptionValue};

/// Protocol used to reach the new instance.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BootstrapProtocol {
    /// SSH, the default for Linux targets.
    Ssh,
    /// WinRM, the default for Windows targets.
    Winrm,
}

impl FromStr for BootstrapProtocol {
    type Err = UnknownOptionValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ssh" => Ok(Self::Ssh),
            "winrm" => Ok(Self::Winrm),
            other => Err(UnknownOptionValue {
                option: "bootstrap protocol",
                value: other.to_owned(),
            }),
        }
    }
}

/// Resolves the bootstrap protocol: an explicit option wins, otherwise the
/// platform decides (Windows → WinRM, anything else → SSH).
///
/// # Errors
///
/// Returns [`UnknownOptionValue`] when an explicit protocol option is
/// outside the enumeration.
pub fn effective_protocol(
    config: &EffectiveConfig,
) -> Result<BootstrapProtocol, UnknownOptionValue> {
    if let Some(raw) = config.bootstrap_protocol.as_deref() {
        return BootstrapProtocol::from_str(raw);
    }
    match Platform::from_str(&config.platform) {
        Ok(Platform::Windows) => Ok(BootstrapProtocol::Winrm),
        Ok(Platform::Linux) | Err(_) => Ok(BootstrapProtocol::Ssh),
    }
}

/// Everything the bootstrap collaborator needs to enrol one instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootstrapTarget {
    /// Address the connection is made to.
    pub address: String,
    /// Protocol to connect with.
    pub protocol: BootstrapProtocol,
    /// Remote user.
    pub user: String,
    /// Remote port.
    pub port: u16,
    /// Identity file for SSH authentication, when configured.
    pub identity_file: Option<String>,
    /// Password for WinRM authentication, when configured.
    pub password: Option<String>,
    /// Distribution hint for the remote bootstrap.
    pub distro_hint: Option<String>,
    /// Node name the instance registers under.
    pub node_name: String,
}

/// Errors raised while bootstrapping an instance.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BootstrapError {
    /// Raised when the bootstrap client cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Client binary that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the remote bootstrap exits non-zero.
    #[error("bootstrap exited with status {status}: {stderr}")]
    Failed {
        /// Exit status reported by the client.
        status: i32,
        /// Stderr captured from the client.
        stderr: String,
    },
    /// Raised when the client finishes without yielding an exit status.
    #[error("{program} did not return an exit code")]
    MissingExitCode {
        /// Client that completed without a status.
        program: String,
    },
}

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, BootstrapError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, BootstrapError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| BootstrapError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Collaborator that enrols a freshly created instance into the fleet.
pub trait Bootstrapper {
    /// Runs the remote bootstrap against `target`.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError`] when the bootstrap cannot start or exits
    /// non-zero; the orchestrator passes the result through unchanged.
    fn bootstrap(&self, target: &BootstrapTarget) -> Result<(), BootstrapError>;
}

/// Process-backed bootstrapper driving the system ssh / winrs clients.
#[derive(Debug)]
pub struct ProcessBootstrapper<R: CommandRunner> {
    runner: R,
    ssh_bin: String,
    winrs_bin: String,
    command_template: String,
}

impl ProcessBootstrapper<ProcessCommandRunner> {
    /// Convenience constructor wiring the real process runner from
    /// configuration.
    #[must_use]
    pub fn from_config(config: &EffectiveConfig) -> Self {
        Self::new(
            ProcessCommandRunner,
            config.ssh_bin.clone(),
            config.winrs_bin.clone(),
            config.bootstrap_command.clone(),
        )
    }
}

impl<R: CommandRunner> ProcessBootstrapper<R> {
    /// Creates a bootstrapper with the given runner and client binaries.
    ///
    /// `command_template` is the remote command line; `{node}` and
    /// `{distro}` placeholders are substituted per target.
    #[must_use]
    pub const fn new(
        runner: R,
        ssh_bin: String,
        winrs_bin: String,
        command_template: String,
    ) -> Self {
        Self {
            runner,
            ssh_bin,
            winrs_bin,
            command_template,
        }
    }

    fn remote_command(&self, target: &BootstrapTarget) -> String {
        self.command_template
            .replace("{node}", &target.node_name)
            .replace("{distro}", target.distro_hint.as_deref().unwrap_or("ubuntu"))
    }

    fn ssh_args(&self, target: &BootstrapTarget) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(target.port.to_string()),
            OsString::from("-o"),
            OsString::from("BatchMode=yes"),
            OsString::from("-o"),
            OsString::from("StrictHostKeyChecking=no"),
            OsString::from("-o"),
            OsString::from("UserKnownHostsFile=/dev/null"),
        ];
        if let Some(identity) = target.identity_file.as_deref() {
            args.push(OsString::from("-i"));
            args.push(OsString::from(identity));
        }
        args.push(OsString::from(format!("{}@{}", target.user, target.address)));
        args.push(OsString::from(
            escape(self.remote_command(target).into()).into_owned(),
        ));
        args
    }

    fn winrs_args(&self, target: &BootstrapTarget) -> Vec<OsString> {
        let mut args = vec![
            OsString::from(format!("-r:http://{}:{}", target.address, target.port)),
            OsString::from(format!("-u:{}", target.user)),
        ];
        if let Some(password) = target.password.as_deref() {
            args.push(OsString::from(format!("-p:{password}")));
        }
        args.push(OsString::from(self.remote_command(target)));
        args
    }
}

impl<R: CommandRunner> Bootstrapper for ProcessBootstrapper<R> {
    fn bootstrap(&self, target: &BootstrapTarget) -> Result<(), BootstrapError> {
        let (program, args) = match target.protocol {
            BootstrapProtocol::Ssh => (self.ssh_bin.as_str(), self.ssh_args(target)),
            BootstrapProtocol::Winrm => (self.winrs_bin.as_str(), self.winrs_args(target)),
        };

        let output = self.runner.run(program, &args)?;
        match output.code {
            Some(0) => Ok(()),
            Some(status) => Err(BootstrapError::Failed {
                status,
                stderr: output.stderr,
            }),
            None => Err(BootstrapError::MissingExitCode {
                program: program.to_owned(),
            }),
        }
    }
}

/// Selects the externally visible address the bootstrap connects to.
///
/// An explicit connect-attribute override wins; otherwise a VPC placement
/// without public-IP association uses the private address, and everything
/// else uses the public DNS name (falling back to the public IP when the
/// provider has not published a DNS name yet). `None` means no usable
/// address exists and provisioning must fail.
#[must_use]
pub fn bootstrap_address(
    config: &EffectiveConfig,
    server: &ProvisionedServer,
) -> Option<String> {
    let non_empty = |value: &Option<String>| {
        value
            .as_deref()
            .filter(|text| !text.is_empty())
            .map(str::to_owned)
    };

    if let Some(Ok(attribute)) = config
        .connect_attribute
        .as_deref()
        .map(ConnectAttribute::from_str)
    {
        return match attribute {
            ConnectAttribute::PublicIp => non_empty(&server.public_ip),
            ConnectAttribute::PrivateIp => non_empty(&server.private_ip),
            ConnectAttribute::PublicDns => non_empty(&server.public_dns),
            ConnectAttribute::PrivateDns => non_empty(&server.private_dns),
        };
    }

    if config.vpc_mode() && config.associate_public_ip != Some(true) {
        return non_empty(&server.private_ip);
    }

    non_empty(&server.public_dns).or_else(|| non_empty(&server.public_ip))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::gateway::ServerState;
    use crate::test_helpers::effective;

    fn server() -> ProvisionedServer {
        ProvisionedServer {
            id: String::from("i-1"),
            state: ServerState::Running,
            public_ip: Some(String::from("203.0.113.7")),
            private_ip: Some(String::from("10.0.0.7")),
            public_dns: Some(String::from("ec2-203-0-113-7.compute-1.amazonaws.com")),
            private_dns: Some(String::from("ip-10-0-0-7.ec2.internal")),
            root_device_type: Some(String::from("ebs")),
            subnet_id: None,
        }
    }

    #[test]
    fn classic_mode_uses_public_dns() {
        let config = effective(|_| {});
        assert_eq!(
            bootstrap_address(&config, &server()).as_deref(),
            Some("ec2-203-0-113-7.compute-1.amazonaws.com")
        );
    }

    #[test]
    fn vpc_without_public_ip_uses_private_address() {
        let config = effective(|cli| {
            cli.subnet = Some(String::from("subnet-1"));
            cli.associate_public_ip = Some(false);
        });
        assert_eq!(bootstrap_address(&config, &server()).as_deref(), Some("10.0.0.7"));
    }

    #[test]
    fn vpc_with_public_ip_uses_public_dns() {
        let config = effective(|cli| {
            cli.subnet = Some(String::from("subnet-1"));
            cli.associate_public_ip = Some(true);
        });
        assert_eq!(
            bootstrap_address(&config, &server()).as_deref(),
            Some("ec2-203-0-113-7.compute-1.amazonaws.com")
        );
    }

    #[test]
    fn connect_attribute_override_wins() {
        let config = effective(|cli| {
            cli.subnet = Some(String::from("subnet-1"));
            cli.associate_public_ip = Some(false);
            cli.connect_attribute = Some(String::from("public_ip"));
        });
        assert_eq!(bootstrap_address(&config, &server()).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn missing_address_yields_none() {
        let config = effective(|cli| {
            cli.subnet = Some(String::from("subnet-1"));
        });
        let bare = ProvisionedServer {
            public_ip: None,
            private_ip: None,
            public_dns: None,
            private_dns: None,
            ..server()
        };
        assert_eq!(bootstrap_address(&config, &bare), None);
    }

    #[test]
    fn empty_dns_falls_back_to_public_ip() {
        let config = effective(|_| {});
        let no_dns = ProvisionedServer {
            public_dns: Some(String::new()),
            ..server()
        };
        assert_eq!(bootstrap_address(&config, &no_dns).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn protocol_defaults_follow_the_platform() {
        let linux = effective(|_| {});
        let windows = effective(|cli| cli.platform = Some(String::from("windows")));
        let forced = effective(|cli| {
            cli.platform = Some(String::from("windows"));
            cli.bootstrap_protocol = Some(String::from("ssh"));
        });

        assert_eq!(effective_protocol(&linux), Ok(BootstrapProtocol::Ssh));
        assert_eq!(effective_protocol(&windows), Ok(BootstrapProtocol::Winrm));
        assert_eq!(effective_protocol(&forced), Ok(BootstrapProtocol::Ssh));
    }

    /// Runner double that records the invocation and returns a scripted exit.
    struct ScriptedRunner {
        exit: Option<i32>,
        seen: Mutex<Vec<(String, Vec<OsString>)>>,
    }

    impl CommandRunner for ScriptedRunner {
        fn run(
            &self,
            program: &str,
            args: &[OsString],
        ) -> Result<CommandOutput, BootstrapError> {
            self.seen
                .lock()
                .expect("runner mutex")
                .push((program.to_owned(), args.to_vec()));
            Ok(CommandOutput {
                code: self.exit,
                stdout: String::new(),
                stderr: String::from("remote said no"),
            })
        }
    }

    fn ssh_target() -> BootstrapTarget {
        BootstrapTarget {
            address: String::from("203.0.113.7"),
            protocol: BootstrapProtocol::Ssh,
            user: String::from("ubuntu"),
            port: 22,
            identity_file: Some(String::from("/keys/deploy.pem")),
            password: None,
            distro_hint: Some(String::from("debian")),
            node_name: String::from("web-1"),
        }
    }

    #[test]
    fn ssh_invocation_carries_identity_and_substituted_command() {
        let runner = ScriptedRunner {
            exit: Some(0),
            seen: Mutex::new(Vec::new()),
        };
        let bootstrapper = ProcessBootstrapper::new(
            runner,
            String::from("ssh"),
            String::from("winrs"),
            String::from("sudo enroll --node {node} --distro {distro}"),
        );

        bootstrapper.bootstrap(&ssh_target()).expect("bootstrap succeeds");

        let seen = bootstrapper.runner.seen.lock().expect("runner mutex");
        let (program, args) = seen.first().expect("one invocation");
        assert_eq!(program, "ssh");
        assert!(args.contains(&OsString::from("-i")));
        assert!(args.contains(&OsString::from("/keys/deploy.pem")));
        assert!(args.contains(&OsString::from("ubuntu@203.0.113.7")));
        let rendered = args.last().expect("remote command").to_string_lossy().into_owned();
        assert!(rendered.contains("--node web-1"), "rendered: {rendered}");
        assert!(rendered.contains("--distro debian"), "rendered: {rendered}");
    }

    #[test]
    fn winrm_invocation_targets_the_winrs_client() {
        let runner = ScriptedRunner {
            exit: Some(0),
            seen: Mutex::new(Vec::new()),
        };
        let bootstrapper = ProcessBootstrapper::new(
            runner,
            String::from("ssh"),
            String::from("winrs"),
            String::from("enroll"),
        );
        let target = BootstrapTarget {
            protocol: BootstrapProtocol::Winrm,
            user: String::from("Administrator"),
            port: 5985,
            password: Some(String::from("hunter2")),
            ..ssh_target()
        };

        bootstrapper.bootstrap(&target).expect("bootstrap succeeds");

        let seen = bootstrapper.runner.seen.lock().expect("runner mutex");
        let (program, args) = seen.first().expect("one invocation");
        assert_eq!(program, "winrs");
        assert!(args.contains(&OsString::from("-r:http://203.0.113.7:5985")));
        assert!(args.contains(&OsString::from("-u:Administrator")));
        assert!(args.contains(&OsString::from("-p:hunter2")));
    }

    #[test]
    fn non_zero_exit_surfaces_stderr() {
        let runner = ScriptedRunner {
            exit: Some(3),
            seen: Mutex::new(Vec::new()),
        };
        let bootstrapper = ProcessBootstrapper::new(
            runner,
            String::from("ssh"),
            String::from("winrs"),
            String::from("enroll"),
        );

        let err = bootstrapper
            .bootstrap(&ssh_target())
            .expect_err("bootstrap fails");
        assert_eq!(
            err,
            BootstrapError::Failed {
                status: 3,
                stderr: String::from("remote said no"),
            }
        );
    }
}
