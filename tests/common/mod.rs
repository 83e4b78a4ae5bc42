//! Shared fixtures and doubles for the provisioning flow tests.
//!
//! Provides a scripted gateway that records call counts and allows
//! controlled failures per phase, plus a recording bootstrapper.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use skylift::cli::CreateCommand;
use skylift::{
    AddressScope, AmiMetadata, AmiRootDevice, BootstrapError, BootstrapTarget, Bootstrapper,
    CloudGateway, Ec2Config, EffectiveConfig, ElasticIp, GatewayError, GatewayFuture, LaunchSpec,
    ProvisionedServer, RootDeviceKind, ServerState,
};

/// A persisted configuration carrying only the compiled-in defaults.
pub fn file_config() -> Ec2Config {
    Ec2Config {
        region: String::from("us-east-1"),
        node_name: None,
        image: None,
        flavor: String::from("t2.micro"),
        availability_zone: None,
        placement_group: None,
        ssh_key: None,
        security_groups: None,
        security_group_ids: None,
        subnet: None,
        private_ip_address: None,
        associate_public_ip: None,
        dedicated: None,
        ebs_size: None,
        ebs_volume_type: None,
        ebs_provisioned_iops: None,
        ebs_optimized: None,
        ebs_no_delete_on_term: None,
        ephemeral: None,
        iam_profile: None,
        tags: None,
        user_data: None,
        platform: String::from("linux"),
        bootstrap_protocol: None,
        ssh_user: String::from("ubuntu"),
        ssh_port: 22,
        identity_file: None,
        winrm_user: String::from("Administrator"),
        winrm_password: None,
        winrm_port: 5985,
        associate_eip: None,
        connect_attribute: None,
        delete_on_failure: None,
        distro: None,
        bootstrap_command: String::from("sudo cloud-init status --wait"),
        ssh_bin: String::from("ssh"),
        winrs_bin: String::from("winrs"),
        visibility_attempts: 6,
        visibility_delay_secs: 5,
        association_timeout_secs: 120,
        association_poll_secs: 5,
    }
}

/// Resolves an [`EffectiveConfig`] with an image pre-set and the supplied
/// CLI mutations applied.
pub fn effective(mutate: impl FnOnce(&mut CreateCommand)) -> EffectiveConfig {
    let mut cli = CreateCommand {
        image: Some(String::from("ami-1")),
        ..CreateCommand::default()
    };
    mutate(&mut cli);
    EffectiveConfig::resolve(&cli, &file_config())
}

/// An EBS-backed image matching the `ami-1` default of [`effective`].
pub fn ebs_ami() -> AmiMetadata {
    AmiMetadata {
        image_id: String::from("ami-1"),
        root_device: RootDeviceKind::Ebs,
        root_volume: Some(AmiRootDevice {
            device_name: String::from("/dev/sda1"),
            volume_size_gib: 8,
            iops: None,
            delete_on_termination: true,
        }),
        windows: false,
    }
}

/// A running server with the full address set populated.
pub fn running_server() -> ProvisionedServer {
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

/// An unattached classic-scope elastic IP.
pub fn classic_eip(public_ip: &str) -> ElasticIp {
    ElasticIp {
        public_ip: public_ip.to_owned(),
        allocation_id: None,
        scope: AddressScope::Standard,
        attached_instance: None,
    }
}

#[derive(Debug, Default)]
struct GatewayState {
    ami: Option<AmiMetadata>,
    addresses: Vec<ElasticIp>,
    tag_not_visible: u32,
    describes: VecDeque<ProvisionedServer>,
    steady: Option<ProvisionedServer>,
    create_calls: u32,
    tag_calls: u32,
    associate_calls: u32,
    terminate_calls: u32,
}

/// Scripted gateway double recording every call.
#[derive(Clone, Debug, Default)]
pub struct FakeGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        let gateway = Self::default();
        gateway.lock().ami = Some(ebs_ami());
        gateway.lock().steady = Some(running_server());
        gateway
    }

    fn lock(&self) -> MutexGuard<'_, GatewayState> {
        self.state
            .lock()
            .unwrap_or_else(|err| panic!("fake gateway lock poisoned: {err}"))
    }

    /// Replaces the steady-state describe response.
    pub fn set_steady(&self, server: ProvisionedServer) {
        self.lock().steady = Some(server);
    }

    /// Makes describe report the server as gone.
    pub fn vanish(&self) {
        self.lock().steady = None;
    }

    /// Queues a one-shot describe response ahead of the steady state.
    pub fn push_describe(&self, server: ProvisionedServer) {
        self.lock().describes.push_back(server);
    }

    /// Makes the next `count` tag calls fail with a not-visible error.
    pub fn tag_not_visible(&self, count: u32) {
        self.lock().tag_not_visible = count;
    }

    pub fn set_addresses(&self, addresses: Vec<ElasticIp>) {
        self.lock().addresses = addresses;
    }

    pub fn create_calls(&self) -> u32 {
        self.lock().create_calls
    }

    pub fn tag_calls(&self) -> u32 {
        self.lock().tag_calls
    }

    pub fn associate_calls(&self) -> u32 {
        self.lock().associate_calls
    }

    pub fn terminate_calls(&self) -> u32 {
        self.lock().terminate_calls
    }
}

impl CloudGateway for FakeGateway {
    fn describe_image<'a>(
        &'a self,
        _image_id: &'a str,
    ) -> GatewayFuture<'a, Option<AmiMetadata>> {
        Box::pin(async move { Ok(self.lock().ami.clone()) })
    }

    fn create_server<'a>(&'a self, _spec: &'a LaunchSpec) -> GatewayFuture<'a, String> {
        Box::pin(async move {
            self.lock().create_calls += 1;
            Ok(String::from("i-1"))
        })
    }

    fn describe_server<'a>(
        &'a self,
        _server_id: &'a str,
    ) -> GatewayFuture<'a, Option<ProvisionedServer>> {
        Box::pin(async move {
            let mut state = self.lock();
            if let Some(queued) = state.describes.pop_front() {
                return Ok(Some(queued));
            }
            Ok(state.steady.clone())
        })
    }

    fn tag_server<'a>(
        &'a self,
        server_id: &'a str,
        _key: &'a str,
        _value: &'a str,
    ) -> GatewayFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.tag_calls += 1;
            if state.tag_not_visible > 0 {
                state.tag_not_visible -= 1;
                return Err(GatewayError::NotVisible {
                    resource: server_id.to_owned(),
                });
            }
            Ok(())
        })
    }

    fn list_elastic_ips(&self) -> GatewayFuture<'_, Vec<ElasticIp>> {
        Box::pin(async move { Ok(self.lock().addresses.clone()) })
    }

    fn associate_elastic_ip<'a>(
        &'a self,
        _server_id: &'a str,
        _address: &'a ElasticIp,
    ) -> GatewayFuture<'a, ()> {
        Box::pin(async move {
            self.lock().associate_calls += 1;
            Ok(())
        })
    }

    fn terminate_server<'a>(&'a self, _server_id: &'a str) -> GatewayFuture<'a, ()> {
        Box::pin(async move {
            self.lock().terminate_calls += 1;
            Ok(())
        })
    }
}

#[derive(Debug, Default)]
struct BootstrapState {
    fail: bool,
    targets: Vec<BootstrapTarget>,
}

/// Bootstrapper double recording every target it was handed.
#[derive(Clone, Debug, Default)]
pub struct FakeBootstrapper {
    state: Arc<Mutex<BootstrapState>>,
}

impl FakeBootstrapper {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BootstrapState> {
        self.state
            .lock()
            .unwrap_or_else(|err| panic!("fake bootstrapper lock poisoned: {err}"))
    }

    /// Makes every bootstrap call fail.
    pub fn fail(&self) {
        self.lock().fail = true;
    }

    pub fn targets(&self) -> Vec<BootstrapTarget> {
        self.lock().targets.clone()
    }
}

impl Bootstrapper for FakeBootstrapper {
    fn bootstrap(&self, target: &BootstrapTarget) -> Result<(), BootstrapError> {
        let mut state = self.lock();
        state.targets.push(target.clone());
        if state.fail {
            return Err(BootstrapError::Failed {
                status: 1,
                stderr: String::from("enrolment rejected"),
            });
        }
        Ok(())
    }
}
