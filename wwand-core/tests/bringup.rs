use async_trait::async_trait;
use mockall::mock;
use mockall::predicate::eq;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use wwand_at::AtError;
use wwand_core::{
    AuthConfig, AuthError, AuthOutcome, AuthStage, BringUp, BringUpError,
    CredentialsError, CredentialsProvider, DeviceInit, DeviceProfile, FailureTag,
    InitStage, ModemCommands, PinStatus, PukPair, RegistrationError, RegistrationInfo,
    RegistrationStage, SimAuthStage, Stage,
};

mock! {
    pub Modem {}
    #[async_trait]
    impl ModemCommands for Modem {
        async fn pin_status(&mut self) -> Result<PinStatus, AtError>;
        async fn send_pin(&mut self, pin: &str) -> Result<(), AtError>;
        async fn send_puk(&mut self, puk: &str, pin: &str) -> Result<(), AtError>;
        async fn send_puk2(&mut self, puk: &str, pin: &str) -> Result<(), AtError>;
        async fn run_init(&mut self, sequence: &[String]) -> Result<(), AtError>;
        async fn set_connection_mode(&mut self, literal: &str) -> Result<(), AtError>;
    }
}

struct OkAuth;

#[async_trait]
impl AuthStage for OkAuth {
    async fn run(&mut self) -> Result<AuthOutcome, AuthError> {
        Ok(AuthOutcome::AlreadyReady)
    }
}

struct FailAuth(AuthError);

#[async_trait]
impl AuthStage for FailAuth {
    async fn run(&mut self) -> Result<AuthOutcome, AuthError> {
        Err(self.0.clone())
    }
}

struct OkInit;

#[async_trait]
impl InitStage for OkInit {
    async fn run(&mut self) -> Result<(), AtError> {
        Ok(())
    }
}

struct FailInit(AtError);

#[async_trait]
impl InitStage for FailInit {
    async fn run(&mut self) -> Result<(), AtError> {
        Err(self.0.clone())
    }
}

struct OkRegistration;

#[async_trait]
impl RegistrationStage for OkRegistration {
    async fn run(&mut self) -> Result<RegistrationInfo, RegistrationError> {
        Ok(RegistrationInfo {
            operator: Some("26201".to_string()),
            roaming: false,
        })
    }
}

fn device() -> Arc<Mutex<MockModem>> {
    Arc::new(Mutex::new(MockModem::new()))
}

fn plain_bring_up(device: Arc<Mutex<MockModem>>, profile: DeviceProfile) -> BringUp {
    BringUp::new(
        Box::new(OkAuth),
        Box::new(OkInit),
        Box::new(OkRegistration),
        device,
        profile,
    )
}

#[tokio::test]
async fn it_runs_the_stages_in_order_and_ends_ready() {
    let mut bring_up = plain_bring_up(device(), DeviceProfile::default());
    let log = Arc::new(StdMutex::new(Vec::new()));
    for stage in [Stage::Auth, Stage::Init, Stage::Registration, Stage::Ready] {
        let enter = log.clone();
        bring_up.on_enter(stage, Box::new(move |s| {
            enter.lock().unwrap().push(format!("enter {s:?}"));
        }));
        let exit = log.clone();
        bring_up.on_exit(stage, Box::new(move |s| {
            exit.lock().unwrap().push(format!("exit {s:?}"));
        }));
    }

    let info = bring_up.start().await.unwrap();

    assert_eq!(info.operator.as_deref(), Some("26201"));
    assert_eq!(bring_up.current_stage(), Stage::Ready);
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "enter Auth",
            "exit Auth",
            "enter Init",
            "exit Init",
            "enter Registration",
            "exit Registration",
            "enter Ready",
        ]
    );
}

#[tokio::test]
async fn it_routes_an_auth_failure_to_the_matching_handler() {
    let mut bring_up = BringUp::new(
        Box::new(FailAuth(AuthError::SimNotInserted)),
        Box::new(OkInit),
        Box::new(OkRegistration),
        device(),
        DeviceProfile::default(),
    );
    let seen = Arc::new(StdMutex::new(Vec::new()));
    let sink = seen.clone();
    bring_up.on_failure(
        FailureTag::SimNotInserted,
        Box::new(move |e| sink.lock().unwrap().push(e.clone())),
    );

    let err = bring_up.start().await.unwrap_err();

    assert_eq!(err, BringUpError::Auth(AuthError::SimNotInserted));
    assert_eq!(*seen.lock().unwrap(), vec![err]);
    // the failing stage never hands over to init
    assert_eq!(bring_up.current_stage(), Stage::Auth);
}

#[tokio::test]
async fn it_propagates_an_unhandled_failure() {
    let mut bring_up = BringUp::new(
        Box::new(OkAuth),
        Box::new(FailInit(AtError::Generic)),
        Box::new(OkRegistration),
        device(),
        DeviceProfile::default(),
    );

    let err = bring_up.start().await.unwrap_err();

    assert_eq!(err.tag(), FailureTag::Init);
    assert_eq!(bring_up.current_stage(), Stage::Init);
}

#[tokio::test]
async fn it_overwrites_a_reregistered_failure_handler() {
    let mut bring_up = BringUp::new(
        Box::new(FailAuth(AuthError::Cancelled)),
        Box::new(OkInit),
        Box::new(OkRegistration),
        device(),
        DeviceProfile::default(),
    );
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let counter = first.clone();
    bring_up.on_failure(
        FailureTag::AuthCancelled,
        Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let counter = second.clone();
    bring_up.on_failure(
        FailureTag::AuthCancelled,
        Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    bring_up.start().await.unwrap_err();

    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn it_applies_the_preferred_connection_mode_when_ready() {
    let literal = "AT^SYSCFG=14,2,3FFFFFFF,1,2";
    let device = device();
    device
        .lock()
        .await
        .expect_set_connection_mode()
        .with(eq(literal))
        .times(1)
        .returning(|_| Ok(()));

    let profile = DeviceProfile {
        vendor: "huawei".to_string(),
        connection_modes: HashMap::from([("3g_only".to_string(), literal.to_string())]),
        preferred_mode: Some("3g_only".to_string()),
        ..DeviceProfile::default()
    };
    let mut bring_up = plain_bring_up(device, profile);

    bring_up.start().await.unwrap();
}

#[tokio::test]
async fn it_tolerates_a_missing_preferred_mode_entry() {
    let device = device();
    device
        .lock()
        .await
        .expect_set_connection_mode()
        .times(0);

    let profile = DeviceProfile {
        vendor: "huawei".to_string(),
        preferred_mode: Some("lte".to_string()),
        ..DeviceProfile::default()
    };
    let mut bring_up = plain_bring_up(device, profile);

    bring_up.start().await.unwrap();
    assert_eq!(bring_up.current_stage(), Stage::Ready);
}

struct StaticProvider;

#[async_trait]
impl CredentialsProvider for StaticProvider {
    async fn get_pin(&self) -> Result<String, CredentialsError> {
        Ok("1234".to_string())
    }

    async fn get_puk(&self) -> Result<PukPair, CredentialsError> {
        Err(CredentialsError::Cancelled)
    }

    async fn get_puk2(&self) -> Result<PukPair, CredentialsError> {
        Err(CredentialsError::Cancelled)
    }
}

#[tokio::test(start_paused = true)]
async fn it_brings_a_device_up_end_to_end() {
    let sequence = vec!["reset".to_string(), "echo_off".to_string()];
    let device = device();
    {
        let mut modem = device.lock().await;
        modem
            .expect_pin_status()
            .times(1)
            .returning(|| Ok(PinStatus::Ready));
        let expected = sequence.clone();
        modem
            .expect_run_init()
            .withf(move |seq| seq == expected)
            .times(1)
            .returning(|_| Ok(()));
    }

    let auth = SimAuthStage::new(
        device.clone(),
        Arc::new(StaticProvider),
        AuthConfig::default(),
    );
    let init = DeviceInit::new(device.clone(), sequence.clone());
    let profile = DeviceProfile {
        vendor: "huawei".to_string(),
        init_sequence: sequence,
        ..DeviceProfile::default()
    };
    let mut bring_up = BringUp::new(
        Box::new(auth),
        Box::new(init),
        Box::new(OkRegistration),
        device,
        profile,
    );

    let info = bring_up.start().await.unwrap();

    assert!(!info.roaming);
    assert_eq!(bring_up.current_stage(), Stage::Ready);
}
