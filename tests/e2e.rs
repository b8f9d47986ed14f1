//! End-to-end tests for padrelayd
//!
//! Each test runs a real listener on loopback, connects over TCP and checks
//! what the per-session controller was asked to do.

use padrelay_common::{digest, HANDSHAKE_MAGIC};
use padrelay_e2e_tests::{wait_for_calls, TestEnvironment, TestResult};
use padrelayd::buttons::{BTN_A, BTN_B};
use padrelayd::test_support::DeviceCall;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

const JUMP: &str = "press A\nwait 20\nrelease A\n";

#[tokio::test]
async fn test_macro_plays_on_device() -> TestResult {
    let env = TestEnvironment::new(&[("jump", JUMP)]).await?;

    let mut connection = env.client().connect().await?;
    let id = connection.send_macro("jump").await?;
    assert_eq!(id, digest("jump"));

    let controller = env.controller(0).await?;
    let calls = wait_for_calls(&controller, 4).await?;
    assert_eq!(
        calls,
        vec![
            DeviceCall::Press(BTN_A),
            DeviceCall::Sync,
            DeviceCall::Release(BTN_A),
            DeviceCall::Sync,
        ]
    );

    connection.close().await?;
    env.shutdown().await
}

#[tokio::test]
async fn test_unknown_macro_only_syncs() -> TestResult {
    let env = TestEnvironment::new(&[("jump", JUMP)]).await?;

    let mut connection = env.client().connect().await?;
    connection.send_macro("does-not-exist").await?;

    let controller = env.controller(0).await?;
    assert_eq!(wait_for_calls(&controller, 1).await?, vec![DeviceCall::Sync]);

    sleep(Duration::from_millis(50)).await;
    assert_eq!(controller.calls().len(), 1);

    env.shutdown().await
}

#[tokio::test]
async fn test_bad_magic_is_rejected() -> TestResult {
    let env = TestEnvironment::new(&[]).await?;

    let mut stream = TcpStream::connect(env.address).await?;
    stream.write_u32(0x1234_5678).await?;

    // No challenge is sent; the server just closes
    let mut rest = Vec::new();
    timeout(Duration::from_secs(2), stream.read_to_end(&mut rest)).await??;
    assert!(rest.is_empty());
    assert!(env.factory.opened().is_empty());

    env.shutdown().await
}

#[tokio::test]
async fn test_wrong_response_is_rejected() -> TestResult {
    let env = TestEnvironment::new(&[]).await?;

    let mut stream = TcpStream::connect(env.address).await?;
    stream.write_u32(HANDSHAKE_MAGIC).await?;
    let challenge = stream.read_u64().await?;
    stream.write_u64(challenge.wrapping_add(1)).await?;

    let mut rest = Vec::new();
    timeout(Duration::from_secs(2), stream.read_to_end(&mut rest)).await??;
    assert!(rest.is_empty());
    assert!(env.factory.opened().is_empty());

    env.shutdown().await
}

#[tokio::test]
async fn test_pause_discards_triggers() -> TestResult {
    let env = TestEnvironment::new(&[("b", "press B\n")]).await?;

    let mut connection = env.client().connect().await?;
    let controller = env.controller(0).await?;

    assert!(env.state.control.toggle_pause());
    connection.send_macro("b").await?;
    sleep(Duration::from_millis(100)).await;
    assert!(controller.calls().is_empty());

    assert!(!env.state.control.toggle_pause());
    connection.send_macro("b").await?;
    assert_eq!(
        wait_for_calls(&controller, 2).await?,
        vec![DeviceCall::Press(BTN_B), DeviceCall::Sync]
    );

    env.shutdown().await
}

#[tokio::test]
async fn test_spam_is_throttled() -> TestResult {
    let env = TestEnvironment::new(&[("b", "press B\n")]).await?;

    let mut connection = env.client().connect().await?;
    for _ in 0..3 {
        connection.send_macro("b").await?;
    }

    let controller = env.controller(0).await?;
    wait_for_calls(&controller, 2).await?;
    sleep(Duration::from_millis(100)).await;

    // Only the first trigger lands inside a 500ms window
    let presses = controller
        .calls()
        .into_iter()
        .filter(|call| *call == DeviceCall::Press(BTN_B))
        .count();
    assert_eq!(presses, 1);

    env.shutdown().await
}

#[tokio::test]
async fn test_each_client_gets_its_own_controller() -> TestResult {
    let env = TestEnvironment::new(&[("a", "press A\n"), ("b", "press B\n")]).await?;

    let mut first = env.client().connect().await?;
    let first_controller = env.controller(0).await?;
    let mut second = env.client().connect().await?;
    let second_controller = env.controller(1).await?;

    first.send_macro("a").await?;
    second.send_macro("b").await?;

    assert_eq!(
        wait_for_calls(&first_controller, 2).await?,
        vec![DeviceCall::Press(BTN_A), DeviceCall::Sync]
    );
    assert_eq!(
        wait_for_calls(&second_controller, 2).await?,
        vec![DeviceCall::Press(BTN_B), DeviceCall::Sync]
    );

    env.shutdown().await
}

#[tokio::test]
async fn test_reload_serves_new_macros() -> TestResult {
    let env = TestEnvironment::new(&[("a", "press A\n")]).await?;

    std::fs::write(env.macro_dir.join("b"), "press B\n")?;
    assert_eq!(env.state.macros.reload(&env.macro_dir).await?, 2);

    let mut connection = env.client().connect().await?;
    connection.send_macro("b").await?;

    let controller = env.controller(0).await?;
    assert_eq!(
        wait_for_calls(&controller, 2).await?,
        vec![DeviceCall::Press(BTN_B), DeviceCall::Sync]
    );

    env.shutdown().await
}

#[tokio::test]
async fn test_shutdown_stops_listener() -> TestResult {
    let env = TestEnvironment::new(&[]).await?;
    let client = env.client().with_retry_params(1, 10);

    env.shutdown().await?;
    assert!(client.connect().await.is_err());
    Ok(())
}
