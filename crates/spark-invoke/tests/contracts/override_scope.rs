//! 调用级覆盖合约：覆盖只作用于被包装的第一次调度，嵌套调用不继承，未使用的覆盖不泄漏。

#[path = "../support/mod.rs"]
mod support;

use std::sync::{Arc, OnceLock, Weak};

use spark_invoke::deferred::has_pending_override;
use spark_invoke::{
    EndpointRegistry, HandlerError, InvocationConfig, InvocationRequest, Invoker, Overrides, ProfileId,
    RegistrationTable, ServiceConfig, StrategyKind, Value, defer,
};
use support::{Script, ScriptedRemote, answering, endpoint, text_of};

fn remote_first_config() -> InvocationConfig {
    InvocationConfig::from_toml_str(
        r#"
installation_id = "store-0042"

[services.loyalty]
strategy = "remote_first"
profile_ids = ["local"]

[services.ledger]
strategy = "remote_first"
"#,
    )
    .unwrap()
}

fn invoker(remote: ScriptedRemote) -> Invoker {
    Invoker::builder()
        .registry(
            EndpointRegistry::from_table(
                RegistrationTable::new()
                    .endpoint("loyalty", endpoint("/customer/enroll", answering("local")))
                    .endpoint("ledger", endpoint("/balance", answering("ledger-local"))),
            )
            .unwrap(),
        )
        .config(remote_first_config())
        .remote(remote)
        .build()
}

#[test]
fn override_strategy_wins_and_sentinel_profile_is_kept() {
    let remote = ScriptedRemote::new(Script::Reply("remote"));
    let invoker = invoker(remote.clone());

    let configured = invoker.invoke("loyalty", "/customer/enroll", "1.0.0", vec![]).unwrap();
    assert_eq!(text_of(&configured), "remote");
    assert_eq!(remote.seen()[0].profile_ids, [ProfileId::LOCAL]);

    let forced = defer(|| invoker.invoke("loyalty", "/customer/enroll", "1.0.0", vec![]))
        .using(StrategyKind::LocalOnly)
        .execute()
        .unwrap();
    assert_eq!(text_of(&forced), "local");
    assert_eq!(remote.calls(), 1, "覆盖后不应再访问远端");
}

#[test]
fn override_profiles_reach_the_remote_call() {
    let remote = ScriptedRemote::new(Script::Reply("remote"));
    let invoker = invoker(remote.clone());
    defer(|| invoker.invoke("loyalty", "/customer/enroll", "1.0.0", vec![]))
        .with_profiles(["central", "backup"])
        .execute()
        .unwrap();
    assert_eq!(
        remote.seen()[0].profile_ids,
        [ProfileId::from("central"), ProfileId::from("backup")]
    );
}

#[test]
fn override_applies_only_to_the_first_dispatch() {
    let remote = ScriptedRemote::new(Script::Reply("remote"));
    let invoker = invoker(remote.clone());
    let (first, second) = defer(|| {
        let first = invoker.invoke("loyalty", "/customer/enroll", "1.0.0", vec![]).unwrap();
        let second = invoker.invoke("loyalty", "/customer/enroll", "1.0.0", vec![]).unwrap();
        (first, second)
    })
    .using(StrategyKind::LocalOnly)
    .execute();
    assert_eq!(text_of(&first), "local");
    assert_eq!(text_of(&second), "remote");
}

#[test]
fn nested_dispatch_does_not_inherit_the_override() {
    let remote = ScriptedRemote::new(Script::Reply("ledger-remote"));
    let slot: Arc<OnceLock<Weak<Invoker>>> = Arc::new(OnceLock::new());
    let handle = Arc::clone(&slot);

    let outer = move |_: &[Value]| -> Result<Value, HandlerError> {
        let invoker = handle
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| HandlerError::msg("invoker gone"))?;
        let inner = invoker
            .invoke("ledger", "/balance", "1.0.0", vec![])
            .map_err(HandlerError::new)?;
        Ok(Value::from(format!("outer+{}", text_of(&inner))))
    };

    let invoker = Arc::new(
        Invoker::builder()
            .registry(
                EndpointRegistry::from_table(
                    RegistrationTable::new()
                        .endpoint("loyalty", endpoint("/customer/enroll", outer))
                        .endpoint("ledger", endpoint("/balance", answering("ledger-local"))),
                )
                .unwrap(),
            )
            .config(remote_first_config())
            .remote(remote.clone())
            .build(),
    );
    assert!(slot.set(Arc::downgrade(&invoker)).is_ok());

    let result = defer(|| invoker.invoke("loyalty", "/customer/enroll", "1.0.0", vec![]))
        .using(StrategyKind::LocalOnly)
        .execute()
        .unwrap();
    assert_eq!(text_of(&result), "outer+ledger-remote");
    assert_eq!(remote.calls(), 1);
}

#[test]
fn unused_override_is_cleared_when_the_wrapped_call_returns() {
    let remote = ScriptedRemote::new(Script::Reply("remote"));
    let invoker = invoker(remote.clone());

    defer(|| ()).using(StrategyKind::LocalOnly).execute();
    assert!(!has_pending_override());

    let value = invoker.invoke("loyalty", "/customer/enroll", "1.0.0", vec![]).unwrap();
    assert_eq!(text_of(&value), "remote");
}

#[test]
fn explicit_overrides_work_without_the_scoped_slot() {
    let remote = ScriptedRemote::new(Script::Reply("remote"));
    let invoker = Arc::new(invoker(remote.clone()));

    let request = InvocationRequest::new("loyalty", "/customer/enroll", vec![])
        .with_client_version("1.0.0")
        .with_overrides(Overrides::new().with_strategy(StrategyKind::LocalOnly));
    assert_eq!(text_of(&invoker.dispatch(request).unwrap()), "local");

    let client = invoker.client("loyalty", "1.0.0");
    let via_stub = client
        .call_with(
            "/customer/enroll",
            vec![],
            Overrides::new().with_strategy(StrategyKind::LocalOnly),
        )
        .unwrap();
    assert_eq!(text_of(&via_stub), "local");
    assert_eq!(text_of(&client.call("/customer/enroll", vec![]).unwrap()), "remote");
    assert_eq!(remote.calls(), 1);
}

#[test]
fn scoped_override_wins_over_explicit_parameter() {
    let remote = ScriptedRemote::new(Script::Reply("remote"));
    let invoker = invoker(remote.clone());
    let request = InvocationRequest::new("loyalty", "/customer/enroll", vec![])
        .with_overrides(Overrides::new().with_strategy(StrategyKind::LocalOnly));
    let value = defer(|| invoker.dispatch(request))
        .using(StrategyKind::RemoteOnly)
        .execute()
        .unwrap();
    assert_eq!(text_of(&value), "remote");
}

#[test]
fn service_config_without_strategy_defaults_to_local() {
    let invoker = Invoker::builder()
        .registry(
            EndpointRegistry::from_table(
                RegistrationTable::new().endpoint("loyalty", endpoint("/customer/enroll", answering("local"))),
            )
            .unwrap(),
        )
        .config(InvocationConfig::default().with_service("loyalty", ServiceConfig::default()))
        .remote(ScriptedRemote::new(Script::Reply("remote")))
        .build();
    let value = invoker.invoke("loyalty", "/customer/enroll", "1.0.0", vec![]).unwrap();
    assert_eq!(text_of(&value), "local");
}
