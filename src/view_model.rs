use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    error::{Result, RingError},
    repository::RingRepository,
    types::{ConnectionStatus, HealthMetric, Ring, RingConfig, RingHealthData, ScanStatus},
    use_cases::{
        ConnectRingUseCase, DisconnectRingUseCase, GetRingDataUseCase, MeasureHealthUseCase,
        ScanRingsUseCase, StopScanUseCase,
    },
};

/// Runtime permissions the host platform has granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionState {
    /// Permission to scan for BLE devices
    pub bluetooth_scan: bool,
    /// Permission to connect to BLE devices
    pub bluetooth_connect: bool,
    /// Location permission, required for scanning on older platforms
    pub location: bool,
}

impl PermissionState {
    /// Every permission granted
    #[must_use]
    pub const fn all_granted() -> Self {
        Self {
            bluetooth_scan: true,
            bluetooth_connect: true,
            location: true,
        }
    }

    /// Check whether nothing is missing
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.bluetooth_scan && self.bluetooth_connect && self.location
    }

    /// Names of the permissions still missing
    #[must_use]
    pub fn missing(&self) -> Vec<&'static str> {
        [
            (self.bluetooth_scan, "bluetooth scan"),
            (self.bluetooth_connect, "bluetooth connect"),
            (self.location, "location"),
        ]
        .into_iter()
        .filter_map(|(granted, name)| (!granted).then_some(name))
        .collect()
    }
}

/// Everything the presentation layer renders
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RingUiState {
    /// Repository connection state
    pub connection_status: ConnectionStatus,
    /// Connected ring, if any
    pub connected_ring: Option<Ring>,
    /// Repository scan state
    pub scan_status: ScanStatus,
    /// Rings seen by the running or most recent scan
    pub discovered_rings: Vec<Ring>,
    /// Latest health snapshot
    pub health_data: RingHealthData,
    /// Granted permissions
    pub permissions: PermissionState,
    /// Whether the manual MAC entry form is shown
    pub show_manual_entry: bool,
    /// Message for the dismissible error banner
    pub error_message: Option<String>,
    /// A user action is in flight
    pub is_loading: bool,
    /// A scan is running
    pub is_scanning: bool,
}

/// Use cases the view model forwards user actions to
#[derive(Clone)]
pub struct RingUseCases {
    /// Scan
    pub scan: ScanRingsUseCase,
    /// Stop scan
    pub stop_scan: StopScanUseCase,
    /// Connect
    pub connect: ConnectRingUseCase,
    /// Disconnect
    pub disconnect: DisconnectRingUseCase,
    /// Read data
    pub data: GetRingDataUseCase,
    /// On-demand measurements
    pub measure: MeasureHealthUseCase,
}

impl RingUseCases {
    /// Build every use case over one repository
    #[must_use]
    pub fn new(repository: &Arc<dyn RingRepository>) -> Self {
        Self {
            scan: ScanRingsUseCase::new(repository.clone()),
            stop_scan: StopScanUseCase::new(repository.clone()),
            connect: ConnectRingUseCase::new(repository.clone()),
            disconnect: DisconnectRingUseCase::new(repository.clone()),
            data: GetRingDataUseCase::new(repository.clone()),
            measure: MeasureHealthUseCase::new(repository.clone()),
        }
    }
}

/// Projects repository state into a single [`RingUiState`] snapshot and
/// forwards user actions to the use cases
///
/// Failures never escape: their message lands verbatim in
/// [`RingUiState::error_message`]. Nothing is retried automatically.
pub struct RingViewModel {
    use_cases: RingUseCases,
    state: Arc<watch::Sender<RingUiState>>,
    default_scan_secs: u64,
    projections: Vec<JoinHandle<()>>,
}

impl RingViewModel {
    /// Create a view model and start projecting `repository` state
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn new(repository: Arc<dyn RingRepository>, config: &RingConfig) -> Self {
        let state = Arc::new(watch::Sender::new(RingUiState::default()));

        let projections = vec![
            project(repository.subscribe_connection(), state.clone(), |ui, status| {
                ui.connected_ring = status.ring().cloned();
                ui.connection_status = status;
            }),
            project(repository.subscribe_scan(), state.clone(), |ui, status| {
                ui.is_scanning = status == ScanStatus::Scanning;
                ui.scan_status = status;
            }),
            project(repository.subscribe_discovered(), state.clone(), |ui, rings| {
                ui.discovered_rings = rings;
            }),
            project(repository.subscribe_health(), state.clone(), |ui, health| {
                ui.health_data = health;
            }),
        ];

        Self {
            use_cases: RingUseCases::new(&repository),
            state,
            default_scan_secs: config.default_scan_secs,
            projections,
        }
    }

    /// Current UI snapshot
    #[must_use]
    pub fn state(&self) -> RingUiState {
        self.state.borrow().clone()
    }

    /// Observe the UI snapshot
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RingUiState> {
        self.state.subscribe()
    }

    /// Record the permissions the platform reported
    pub fn update_permissions(&self, permissions: PermissionState) {
        debug!("Permissions updated: {:?}", permissions);
        self.state.send_modify(|ui| ui.permissions = permissions);
    }

    /// Show the manual MAC entry form
    pub fn show_manual_entry(&self) {
        self.state.send_modify(|ui| ui.show_manual_entry = true);
    }

    /// Hide the manual MAC entry form
    pub fn hide_manual_entry(&self) {
        self.state.send_modify(|ui| ui.show_manual_entry = false);
    }

    /// Dismiss the error banner
    pub fn dismiss_error(&self) {
        self.state.send_modify(|ui| ui.error_message = None);
    }

    /// Scan for rings, using the configured duration when `duration_secs` is `None`
    pub async fn start_scan(&self, duration_secs: Option<u64>) {
        let secs = duration_secs.unwrap_or(self.default_scan_secs);
        info!("User requested a {}s scan", secs);
        let scan = self.use_cases.scan.clone();
        self.run(async move { scan.execute(secs).await }).await;
    }

    /// Stop a running scan
    pub async fn stop_scan(&self) {
        self.use_cases.stop_scan.execute().await;
    }

    /// Connect to a ring picked from the scan list or entered manually
    pub async fn connect(&self, mac_address: &str, name: Option<&str>) {
        info!("User requested connection to {}", mac_address);
        let connect = self.use_cases.connect.clone();
        if self
            .run(async move { connect.execute(mac_address, name).await })
            .await
            .is_some()
        {
            self.hide_manual_entry();
        }
    }

    /// Disconnect the current ring
    pub async fn disconnect(&self) {
        let disconnect = self.use_cases.disconnect.clone();
        self.run_unguarded(async move { disconnect.execute().await })
            .await;
    }

    /// Start an on-demand measurement
    pub async fn start_measurement(&self, metric: HealthMetric) {
        let measure = self.use_cases.measure.clone();
        self.run(async move { measure.start(metric).await }).await;
    }

    /// Stop an on-demand measurement
    pub async fn stop_measurement(&self, metric: HealthMetric) {
        let measure = self.use_cases.measure.clone();
        self.run_unguarded(async move { measure.stop(metric).await })
            .await;
    }

    /// Ask the ring for its stored sleep history
    pub async fn sync_sleep(&self) {
        let measure = self.use_cases.measure.clone();
        self.run(async move { measure.sync_sleep().await }).await;
    }

    /// Last known battery percentage, `None` while unavailable
    #[must_use]
    pub fn refresh_battery(&self) -> Option<u8> {
        self.use_cases.data.battery().ok()
    }

    fn check_permissions(&self) -> Result<()> {
        let missing = self.state.borrow().permissions.missing();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RingError::PermissionDenied(format!(
                "missing {}",
                missing.join(", ")
            )))
        }
    }

    /// Run a radio action after checking permissions
    async fn run<T>(&self, action: impl Future<Output = Result<T>>) -> Option<T> {
        if let Err(e) = self.check_permissions() {
            warn!("Action refused: {}", e);
            self.state
                .send_modify(|ui| ui.error_message = Some(e.to_string()));
            return None;
        }
        self.run_unguarded(action).await
    }

    async fn run_unguarded<T>(&self, action: impl Future<Output = Result<T>>) -> Option<T> {
        self.state.send_modify(|ui| {
            ui.is_loading = true;
            ui.error_message = None;
        });

        let result = action.await;

        self.state.send_modify(|ui| {
            ui.is_loading = false;
            if let Err(e) = &result {
                ui.error_message = Some(e.to_string());
            }
        });
        result.ok()
    }
}

impl Drop for RingViewModel {
    fn drop(&mut self) {
        for projection in &self.projections {
            projection.abort();
        }
    }
}

fn project<T, F>(
    mut source: watch::Receiver<T>,
    state: Arc<watch::Sender<RingUiState>>,
    apply: F,
) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&mut RingUiState, T) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let value = source.borrow_and_update().clone();
            state.send_modify(|ui| apply(ui, value));

            if source.changed().await.is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        repository::SdkRingRepository,
        sdk::SdkHealthSnapshot,
        testing::{sample_device, FakeRingSdk},
    };
    use std::time::Duration;

    const MAC: &str = "AA:BB:CC:DD:EE:FF";

    fn view_model(sdk: FakeRingSdk) -> (Arc<FakeRingSdk>, RingViewModel) {
        let sdk = Arc::new(sdk);
        let config = RingConfig::default();
        let repository: Arc<dyn RingRepository> =
            Arc::new(SdkRingRepository::new(sdk.clone(), config.clone()));
        let view_model = RingViewModel::new(repository, &config);
        view_model.update_permissions(PermissionState::all_granted());
        (sdk, view_model)
    }

    #[test]
    fn test_permission_state() {
        let partial = PermissionState {
            bluetooth_scan: true,
            ..PermissionState::default()
        };
        assert!(!partial.is_complete());
        assert_eq!(partial.missing(), vec!["bluetooth connect", "location"]);
        assert!(PermissionState::all_granted().is_complete());
        assert!(PermissionState::all_granted().missing().is_empty());
    }

    #[tokio::test]
    async fn test_actions_refused_without_permissions() {
        let (sdk, view_model) = view_model(FakeRingSdk::new());
        view_model.update_permissions(PermissionState::default());

        view_model.connect(MAC, None).await;

        let state = view_model.state();
        assert!(state
            .error_message
            .as_deref()
            .is_some_and(|m| m.starts_with("Permission denied")));
        assert!(!state.is_loading);
        assert!(sdk.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_projects_connected_ring() {
        let (_sdk, view_model) =
            view_model(FakeRingSdk::new().connects_after(Duration::from_secs(2)));
        view_model.show_manual_entry();

        view_model.connect(MAC, Some("Ring")).await;

        let mut rx = view_model.subscribe();
        let state = rx
            .wait_for(|ui| ui.connected_ring.is_some())
            .await
            .unwrap()
            .clone();
        let ring = state.connected_ring.clone().unwrap();
        assert_eq!(ring.mac_address, MAC);
        assert!(ring.is_connected);
        assert_eq!(state.connection_status, ConnectionStatus::Connected(ring));
        assert!(!state.show_manual_entry);
        assert!(!state.is_loading);
        assert!(state.error_message.is_none());
    }

    #[tokio::test]
    async fn test_failure_surfaces_verbatim_and_can_be_dismissed() {
        let (_sdk, view_model) = view_model(FakeRingSdk::new().fails_connect("gatt 133"));

        view_model.connect(MAC, None).await;
        assert_eq!(
            view_model.state().error_message.as_deref(),
            Some("Failed to connect to device: gatt 133")
        );

        view_model.dismiss_error();
        assert!(view_model.state().error_message.is_none());
    }

    #[tokio::test]
    async fn test_invalid_manual_entry_keeps_form_open() {
        let (_sdk, view_model) = view_model(FakeRingSdk::new());
        view_model.show_manual_entry();

        view_model.connect("AA:BB:CC", None).await;

        let state = view_model.state();
        assert!(state.show_manual_entry);
        assert!(state
            .error_message
            .as_deref()
            .is_some_and(|m| m.starts_with("Invalid MAC address")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_projects_discovered_rings() {
        let devices = vec![
            sample_device("11:22:33:44:55:66", "R02_5566", -45),
            sample_device("AA:BB:CC:DD:EE:01", "R02_EE01", -80),
        ];
        let (_sdk, view_model) =
            view_model(FakeRingSdk::new().reports_devices_after(Duration::from_secs(1), devices));

        view_model.start_scan(Some(3)).await;

        let mut rx = view_model.subscribe();
        let state = rx
            .wait_for(|ui| ui.discovered_rings.len() == 2 && !ui.is_scanning)
            .await
            .unwrap()
            .clone();
        assert!(matches!(state.scan_status, ScanStatus::DevicesFound(_)));
        assert_eq!(state.discovered_rings[0].name, "R02_5566");

        view_model.stop_scan().await;
        let state = rx
            .wait_for(|ui| ui.scan_status == ScanStatus::Idle)
            .await
            .unwrap()
            .clone();
        assert_eq!(state.discovered_rings.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_stays_in_progress_for_whole_window() {
        let (_sdk, view_model) = view_model(FakeRingSdk::new().reports_devices_after(
            Duration::from_secs(1),
            vec![sample_device("11:22:33:44:55:66", "R02_5566", -45)],
        ));

        let midway = async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            view_model.state()
        };
        let ((), state) = tokio::join!(view_model.start_scan(Some(10)), midway);

        assert!(state.is_scanning);
        assert!(state.is_loading);
        assert_eq!(state.scan_status, ScanStatus::Scanning);
        assert_eq!(state.discovered_rings.len(), 1);

        let mut rx = view_model.subscribe();
        let state = rx.wait_for(|ui| !ui.is_scanning).await.unwrap().clone();
        assert!(matches!(state.scan_status, ScanStatus::DevicesFound(ref r) if r.len() == 1));
    }

    #[tokio::test]
    async fn test_health_projection_and_battery() {
        let (sdk, view_model) = view_model(FakeRingSdk::new());
        assert_eq!(view_model.refresh_battery(), None);

        sdk.set_health(SdkHealthSnapshot {
            battery: Some(55),
            steps: Some(4_200),
            ..SdkHealthSnapshot::default()
        });

        let mut rx = view_model.subscribe();
        let state = rx
            .wait_for(|ui| ui.health_data.battery.is_some())
            .await
            .unwrap()
            .clone();
        assert_eq!(state.health_data.battery, Some(55));
        assert_eq!(state.health_data.steps, 4_200);
        assert_eq!(view_model.refresh_battery(), Some(55));
    }

    #[tokio::test]
    async fn test_measurement_without_ring_reports_error() {
        let (_sdk, view_model) = view_model(FakeRingSdk::new());

        view_model.start_measurement(HealthMetric::BloodPressure).await;

        assert_eq!(
            view_model.state().error_message.as_deref(),
            Some("No ring connected")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_clears_projection() {
        let (_sdk, view_model) =
            view_model(FakeRingSdk::new().connects_after(Duration::from_millis(100)));
        view_model.connect(MAC, None).await;

        view_model.disconnect().await;

        let mut rx = view_model.subscribe();
        let state = rx
            .wait_for(|ui| ui.connection_status == ConnectionStatus::Disconnected)
            .await
            .unwrap()
            .clone();
        assert!(state.connected_ring.is_none());
        assert!(state.error_message.is_none());
    }
}
