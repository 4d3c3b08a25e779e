use lib_exchange::{ConfigError, ExchangeConfig, ExchangeCore, ExchangeError, ExchangeSocket, Message, OverflowPolicy};
use tempfile::tempdir;

#[tokio::test]
async fn config_file_drives_the_whole_stack() {
    let dir = tempdir().expect("Failed to create temporary directory");
    let path = dir.path().join("exchange.json");
    std::fs::write(
        &path,
        r#"{
            "name": "sensors",
            "ring": { "capacity": 2, "overflow": "drop" },
            "socket": { "pendingQueueCapacity": 4 }
        }"#,
    )
    .unwrap();

    let config = ExchangeConfig::from_file(&path).unwrap();
    let core = ExchangeCore::from_config(&config).unwrap();
    assert_eq!(core.name(), "sensors");
    assert_eq!(core.store().policy(), OverflowPolicy::Drop);

    let socket = ExchangeSocket::from_config(&config.socket);
    socket.bind(core).unwrap();
    for key in 1..=3 {
        socket.send(Message::publish(key, "t", "x")).await.unwrap();
    }
    assert_eq!(socket.get_dedup_map().keys(), vec![3]);
}

#[test]
fn file_policy_without_persistence_is_rejected() {
    let err = ExchangeConfig::from_json_str(r#"{ "ring": { "overflow": "file" } }"#).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn unvalidated_file_policy_fails_at_construction() {
    let mut config = ExchangeConfig::default();
    config.ring.overflow = OverflowPolicy::File;
    assert!(matches!(
        ExchangeCore::from_config(&config),
        Err(ExchangeError::InvalidArgument(_))
    ));
}
