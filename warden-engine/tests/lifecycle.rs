//! Lifecycle tests for the tunnel controller
//!
//! The backend and the DNS helper are in-memory doubles, so these tests
//! need no privileges and never touch the host's network configuration.

use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use warden_dns::{DnsController, DnsHelper, DnsOperation, InterfaceRecord, InterfaceSource, MacAddress};
use warden_engine::{
    ChannelEventHandler, ConnectParams, Error, Result, TunnelBackend, TunnelController,
    TunnelEvent, TunnelState,
};

const CLIENT: Ipv4Addr = Ipv4Addr::new(10, 5, 0, 2);
const GATEWAY: Ipv4Addr = Ipv4Addr::new(10, 5, 0, 1);
const HOST: Ipv4Addr = Ipv4Addr::new(198, 51, 100, 7);
const MANUAL: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const LAN_DNS: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
const LAN_MAC: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];
const NOT_FOUND: u32 = 0xE000_0001;
const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct FakeBackend {
    ups: AtomicUsize,
    downs: AtomicUsize,
    removals: AtomicUsize,
    interface_up: AtomicBool,
    fail_up: Option<String>,
}

#[async_trait]
impl TunnelBackend for FakeBackend {
    async fn up(&self, params: &ConnectParams) -> Result<()> {
        assert!(params.config_path.exists(), "config must be written before start");
        if let Some(output) = &self.fail_up {
            return Err(Error::ProcessStart {
                output: output.clone(),
            });
        }
        self.ups.fetch_add(1, Ordering::SeqCst);
        self.interface_up.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn down(&self, _params: &ConnectParams) -> Result<()> {
        self.downs.fetch_add(1, Ordering::SeqCst);
        self.interface_up.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn interface_exists(&self, _name: &str) -> Result<bool> {
        Ok(self.interface_up.load(Ordering::SeqCst))
    }

    async fn remove_interface(&self, _name: &str) -> Result<()> {
        self.removals.fetch_add(1, Ordering::SeqCst);
        self.interface_up.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Records tunnel-interface DNS calls as `(dns, op)` pairs and LAN calls
/// with their hardware address
///
/// When linked to a backend, tunnel-interface calls fail the way a real
/// helper does once the backend's link is gone.
#[derive(Default)]
struct RecordingHelper {
    calls: Mutex<Vec<(Option<Ipv4Addr>, DnsOperation)>>,
    hardware_calls: Mutex<Vec<(MacAddress, Option<Ipv4Addr>, DnsOperation)>>,
    fail_set: AtomicBool,
    tunnel: Option<Arc<FakeBackend>>,
}

impl RecordingHelper {
    fn calls(&self) -> Vec<(Option<Ipv4Addr>, DnsOperation)> {
        self.calls.lock().unwrap().clone()
    }

    fn hardware_calls(&self) -> Vec<(MacAddress, Option<Ipv4Addr>, DnsOperation)> {
        self.hardware_calls.lock().unwrap().clone()
    }

    fn lan_ops(&self) -> Vec<DnsOperation> {
        self.hardware_calls().into_iter().map(|(_, _, op)| op).collect()
    }
}

impl DnsHelper for RecordingHelper {
    fn set_dns_by_hardware_address(
        &self,
        hw: &MacAddress,
        dns: Option<Ipv4Addr>,
        op: DnsOperation,
    ) -> u32 {
        self.hardware_calls.lock().unwrap().push((*hw, dns, op));
        0
    }

    fn set_dns_by_local_address(
        &self,
        local: Ipv4Addr,
        dns: Option<Ipv4Addr>,
        op: DnsOperation,
    ) -> u32 {
        assert_eq!(local, CLIENT);
        self.calls.lock().unwrap().push((dns, op));
        if let Some(backend) = &self.tunnel {
            if !backend.interface_up.load(Ordering::SeqCst) {
                return NOT_FOUND;
            }
        }
        if dns.is_some() && self.fail_set.load(Ordering::SeqCst) {
            0x57
        } else {
            0
        }
    }
}

struct NoInterfaces;

impl InterfaceSource for NoInterfaces {
    fn ipv4_networks(&self) -> io::Result<Vec<InterfaceRecord>> {
        Ok(Vec::new())
    }

    fn hardware_address(&self, _record: &InterfaceRecord) -> io::Result<Option<MacAddress>> {
        Ok(None)
    }
}

/// One LAN interface, eth0 on 192.168.1.0/24
struct Lan;

impl InterfaceSource for Lan {
    fn ipv4_networks(&self) -> io::Result<Vec<InterfaceRecord>> {
        Ok(vec![InterfaceRecord::new(
            "eth0",
            Ipv4Addr::new(192, 168, 1, 5),
            Ipv4Addr::new(255, 255, 255, 0),
        )
        .unwrap()])
    }

    fn hardware_address(&self, _record: &InterfaceRecord) -> io::Result<Option<MacAddress>> {
        Ok(Some(MacAddress::new(LAN_MAC)))
    }
}

struct Harness {
    controller: Arc<TunnelController>,
    backend: Arc<FakeBackend>,
    helper: Arc<RecordingHelper>,
    dns: Arc<DnsController>,
    events: UnboundedReceiver<TunnelEvent>,
    dir: TempDir,
}

impl Harness {
    fn new(backend: FakeBackend) -> Self {
        Self::build(Arc::new(backend), RecordingHelper::default(), Arc::new(NoInterfaces))
    }

    /// Harness with a LAN interface and a helper tied to the backend's link
    fn with_lan(backend: FakeBackend) -> Self {
        let backend = Arc::new(backend);
        let helper = RecordingHelper {
            tunnel: Some(backend.clone()),
            ..RecordingHelper::default()
        };
        Self::build(backend, helper, Arc::new(Lan))
    }

    fn build(
        backend: Arc<FakeBackend>,
        helper: RecordingHelper,
        interfaces: Arc<dyn InterfaceSource>,
    ) -> Self {
        let helper = Arc::new(helper);
        let dns = Arc::new(DnsController::new(helper.clone(), interfaces));
        let (handler, events) = ChannelEventHandler::new();

        let controller = TunnelController::new(backend.clone(), dns.clone(), "wgtest")
            .with_event_handler(Arc::new(handler))
            .with_poll_interval(Duration::from_millis(10));

        Self {
            controller: Arc::new(controller),
            backend,
            helper,
            dns,
            events,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn params(&self) -> ConnectParams {
        ConnectParams {
            client_ip: CLIENT,
            client_private_key: "client-key".into(),
            host_local_ip: GATEWAY,
            host_ip: HOST,
            host_port: 2049,
            host_public_key: "host-key".into(),
            binary_path: PathBuf::from("wg-quick"),
            config_path: self.dir.path().join("wgtest.conf"),
        }
    }

    fn spawn_connect(&self) -> JoinHandle<Result<()>> {
        let controller = self.controller.clone();
        let params = self.params();
        tokio::spawn(async move { controller.connect(params).await })
    }

    async fn next_event(&mut self) -> TunnelEvent {
        tokio::time::timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event stream closed")
    }

    async fn expect_connected(&mut self) {
        assert_eq!(self.next_event().await, TunnelEvent::Connecting);
        assert_eq!(
            self.next_event().await,
            TunnelEvent::Connected {
                client_ip: CLIENT,
                host_ip: HOST
            }
        );
    }

    async fn expect_disconnected(&mut self) -> String {
        match self.next_event().await {
            TunnelEvent::Disconnected { reason } => reason,
            other => panic!("expected Disconnected, got {:?}", other),
        }
    }
}

async fn finish(task: JoinHandle<Result<()>>) -> Result<()> {
    tokio::time::timeout(WAIT, task)
        .await
        .expect("connect did not return")
        .expect("connect task panicked")
}

#[tokio::test]
async fn test_pause_resume_round_trip() {
    let mut h = Harness::new(FakeBackend::default());
    let task = h.spawn_connect();
    h.expect_connected().await;
    assert_eq!(h.controller.state(), TunnelState::Running);

    h.controller.pause().await.unwrap();
    assert_eq!(h.next_event().await, TunnelEvent::Paused);
    assert!(h.controller.is_paused());

    h.controller.resume().await.unwrap();
    h.expect_connected().await;
    assert_eq!(h.backend.ups.load(Ordering::SeqCst), 2);

    h.controller.disconnect().await.unwrap();
    h.expect_disconnected().await;
    finish(task).await.unwrap();

    assert_eq!(h.controller.state(), TunnelState::NotRunning);
    assert!(!h.params().config_path.exists());
}

#[tokio::test]
async fn test_disconnect_while_paused() {
    let mut h = Harness::new(FakeBackend::default());
    let task = h.spawn_connect();
    h.expect_connected().await;

    h.controller.pause().await.unwrap();
    assert_eq!(h.next_event().await, TunnelEvent::Paused);

    h.controller.disconnect().await.unwrap();
    h.expect_disconnected().await;
    finish(task).await.unwrap();

    assert_eq!(h.backend.ups.load(Ordering::SeqCst), 1);
    assert_eq!(h.backend.downs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_process_start_failure() {
    let mut h = Harness::new(FakeBackend {
        fail_up: Some("Unable to access interface: Operation not permitted".into()),
        ..FakeBackend::default()
    });

    let err = h.controller.connect(h.params()).await.unwrap_err();
    assert!(matches!(err, Error::ProcessStart { ref output } if output.contains("not permitted")));

    assert_eq!(h.next_event().await, TunnelEvent::Connecting);
    assert!(h.expect_disconnected().await.contains("not permitted"));
    assert!(h.helper.calls().is_empty());
    assert!(!h.params().config_path.exists());
    assert!(!h.controller.is_running());
}

#[tokio::test]
async fn test_dns_apply_failure_restores_and_stops() {
    let mut h = Harness::new(FakeBackend::default());
    h.helper.fail_set.store(true, Ordering::SeqCst);

    let err = h.controller.connect(h.params()).await.unwrap_err();
    match err {
        Error::DnsApply(ref e) => assert_eq!(e.native_code(), Some(0x57)),
        other => panic!("unexpected error: {}", other),
    }

    assert_eq!(
        h.helper.calls(),
        vec![
            (Some(GATEWAY), DnsOperation::Set),
            (None, DnsOperation::Set),
        ]
    );
    assert_eq!(h.backend.downs.load(Ordering::SeqCst), 1);
    assert_eq!(h.next_event().await, TunnelEvent::Connecting);
    h.expect_disconnected().await;
}

#[tokio::test]
async fn test_interface_disappearing_ends_connect() {
    let mut h = Harness::new(FakeBackend::default());
    let task = h.spawn_connect();
    h.expect_connected().await;

    h.backend.interface_up.store(false, Ordering::SeqCst);
    assert_eq!(h.expect_disconnected().await, "tunnel stopped");
    finish(task).await.unwrap();

    // The vanished link is not reset
    assert_eq!(h.helper.calls(), vec![(Some(GATEWAY), DnsOperation::Set)]);
    assert_eq!(h.dns.current(), None);
}

#[tokio::test]
async fn test_disconnect_removes_lan_dns() {
    let mut h = Harness::with_lan(FakeBackend::default());
    h.controller.set_manual_dns(LAN_DNS).await.unwrap();

    let task = h.spawn_connect();
    h.expect_connected().await;
    assert_eq!(
        h.helper.hardware_calls(),
        vec![(MacAddress::new(LAN_MAC), Some(LAN_DNS), DnsOperation::Add)]
    );

    h.controller.disconnect().await.unwrap();
    h.expect_disconnected().await;
    finish(task).await.unwrap();

    assert_eq!(
        h.helper.hardware_calls(),
        vec![
            (MacAddress::new(LAN_MAC), Some(LAN_DNS), DnsOperation::Add),
            (MacAddress::new(LAN_MAC), Some(LAN_DNS), DnsOperation::Del),
        ]
    );
    assert_eq!(h.helper.calls(), vec![(Some(LAN_DNS), DnsOperation::Set)]);
    assert_eq!(h.dns.current(), None);
}

#[tokio::test]
async fn test_pause_resume_cycles_lan_dns() {
    let mut h = Harness::with_lan(FakeBackend::default());
    h.controller.set_manual_dns(LAN_DNS).await.unwrap();

    let task = h.spawn_connect();
    h.expect_connected().await;

    h.controller.pause().await.unwrap();
    assert_eq!(h.next_event().await, TunnelEvent::Paused);
    assert_eq!(h.helper.lan_ops(), vec![DnsOperation::Add, DnsOperation::Del]);
    assert_eq!(h.dns.current(), None);

    h.controller.resume().await.unwrap();
    h.expect_connected().await;
    assert_eq!(h.dns.current(), Some(LAN_DNS));

    h.controller.disconnect().await.unwrap();
    h.expect_disconnected().await;
    finish(task).await.unwrap();

    assert_eq!(
        h.helper.lan_ops(),
        vec![
            DnsOperation::Add,
            DnsOperation::Del,
            DnsOperation::Add,
            DnsOperation::Del,
        ]
    );
}

#[tokio::test]
async fn test_manual_dns_while_running() {
    let mut h = Harness::new(FakeBackend::default());
    let task = h.spawn_connect();
    h.expect_connected().await;

    h.controller.set_manual_dns(MANUAL).await.unwrap();
    assert_eq!(h.helper.calls().last(), Some(&(Some(MANUAL), DnsOperation::Set)));

    h.controller.reset_manual_dns().await.unwrap();
    assert_eq!(h.helper.calls().last(), Some(&(Some(GATEWAY), DnsOperation::Set)));
    assert_eq!(h.controller.manual_dns(), None);

    h.controller.disconnect().await.unwrap();
    finish(task).await.unwrap();
}

#[tokio::test]
async fn test_manual_dns_while_paused_applies_on_resume() {
    let mut h = Harness::new(FakeBackend::default());
    let task = h.spawn_connect();
    h.expect_connected().await;

    h.controller.pause().await.unwrap();
    assert_eq!(h.next_event().await, TunnelEvent::Paused);

    let before = h.helper.calls().len();
    h.controller.set_manual_dns(MANUAL).await.unwrap();
    assert_eq!(h.helper.calls().len(), before);

    h.controller.resume().await.unwrap();
    h.expect_connected().await;
    assert_eq!(h.helper.calls()[before], (Some(MANUAL), DnsOperation::Set));

    h.controller.disconnect().await.unwrap();
    finish(task).await.unwrap();
}

#[tokio::test]
async fn test_second_connect_is_rejected() {
    let mut h = Harness::new(FakeBackend::default());
    let task = h.spawn_connect();
    h.expect_connected().await;

    let err = h.controller.connect(h.params()).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyRunning));

    h.controller.disconnect().await.unwrap();
    finish(task).await.unwrap();
}

#[tokio::test]
async fn test_controls_are_noops_when_not_running() {
    let h = Harness::new(FakeBackend::default());

    h.controller.pause().await.unwrap();
    h.controller.resume().await.unwrap();
    h.controller.disconnect().await.unwrap();
    h.controller.reset_manual_dns().await.unwrap();

    assert_eq!(h.controller.state(), TunnelState::NotRunning);
    assert_eq!(h.backend.downs.load(Ordering::SeqCst), 0);
    assert!(h.helper.calls().is_empty());
}

#[tokio::test]
async fn test_init_removes_stale_interface() {
    let h = Harness::new(FakeBackend::default());
    h.backend.interface_up.store(true, Ordering::SeqCst);

    h.controller.init().await;
    assert_eq!(h.backend.removals.load(Ordering::SeqCst), 1);

    h.controller.init().await;
    assert_eq!(h.backend.removals.load(Ordering::SeqCst), 1);
}
