//! 端点解析优先级合约：override > 变体实现 > 默认实现，回退必须可观测。

#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;
use std::thread;

use spark_invoke::registry::ResolutionSource;
use spark_invoke::{
    EndpointRegistry, InvokeError, Invoker, RegistrationError, RegistrationTable, ServiceDescriptor, Variant, defer,
};
use support::{answering, endpoint, text_of};

const ENROLL: &str = "/customer/enroll";

fn loyalty_table() -> RegistrationTable {
    RegistrationTable::new()
        .endpoint("loyalty", endpoint(ENROLL, answering("default")))
        .endpoint(
            "loyalty",
            endpoint(ENROLL, answering("training")).with_variant(Variant::TRAINING),
        )
        .endpoint(
            "loyalty",
            endpoint(ENROLL, answering("training-override"))
                .with_variant(Variant::TRAINING)
                .as_override(),
        )
        .endpoint("loyalty", endpoint("/customer/lookup", answering("lookup-default")))
        .endpoint(
            "loyalty",
            endpoint("/customer/lookup", answering("lookup-patched")).as_override(),
        )
        .endpoint(
            "loyalty",
            endpoint("/customer/merge", answering("merge-kiosk")).with_variant(Variant::new("kiosk")),
        )
}

fn resolved_text(registry: &EndpointRegistry, path: &str, variant: &Variant) -> String {
    let resolution = registry.resolve("loyalty", path, variant).expect("应能解析");
    let value = resolution.endpoint().handle(&[]).expect("Handler 不应失败");
    text_of(&value).to_owned()
}

#[test]
fn override_beats_variant_specific_descriptor() {
    let registry = EndpointRegistry::from_table(loyalty_table()).unwrap();
    assert_eq!(resolved_text(&registry, ENROLL, &Variant::TRAINING), "training-override");
    let resolution = registry.resolve("loyalty", ENROLL, &Variant::TRAINING).unwrap();
    assert_eq!(resolution.source(), ResolutionSource::Override);
    assert!(!resolution.is_fallback());
}

#[test]
fn default_variant_prefers_its_override() {
    let registry = EndpointRegistry::from_table(loyalty_table()).unwrap();
    assert_eq!(resolved_text(&registry, "/customer/lookup", &Variant::DEFAULT), "lookup-patched");
    assert_eq!(resolved_text(&registry, ENROLL, &Variant::DEFAULT), "default");
}

#[test]
fn missing_variant_falls_back_to_default_and_reports_actual() {
    let registry = EndpointRegistry::from_table(loyalty_table()).unwrap();
    let resolution = registry
        .resolve("loyalty", "/customer/lookup", &Variant::TRAINING)
        .unwrap();
    assert!(resolution.is_fallback());
    assert_eq!(resolution.requested(), &Variant::TRAINING);
    assert_eq!(resolution.actual(), &Variant::DEFAULT);
    assert_eq!(resolved_text(&registry, "/customer/lookup", &Variant::TRAINING), "lookup-patched");

    let exact = registry.resolve_exact("loyalty", "/customer/lookup", &Variant::TRAINING);
    assert!(matches!(exact, Err(InvokeError::EndpointNotFound { .. })));
}

#[test]
fn path_without_default_is_not_found_for_other_variants() {
    let registry = EndpointRegistry::from_table(loyalty_table()).unwrap();
    assert_eq!(
        resolved_text(&registry, "/customer/merge", &Variant::new("kiosk")),
        "merge-kiosk"
    );
    let err = registry
        .resolve("loyalty", "/customer/merge", &Variant::DEFAULT)
        .expect_err("没有默认实现");
    assert_eq!(err.code(), "invoke.endpoint.not_found");
    assert!(err.to_string().contains("/customer/merge"));
}

#[test]
fn duplicate_registrations_fail_fast() {
    let duplicate_override = EndpointRegistry::from_table(
        loyalty_table().endpoint(
            "loyalty",
            endpoint("/customer/lookup", answering("second-patch")).as_override(),
        ),
    );
    assert!(matches!(
        duplicate_override,
        Err(RegistrationError::DuplicateOverride { .. })
    ));

    let duplicate_plain = EndpointRegistry::from_table(
        loyalty_table().endpoint("loyalty", endpoint(ENROLL, answering("again"))),
    );
    assert!(matches!(duplicate_plain, Err(RegistrationError::DuplicateEndpoint { .. })));

    let registry = EndpointRegistry::from_table(loyalty_table()).unwrap();
    let again = registry.register(ServiceDescriptor::new("loyalty"));
    assert!(matches!(again, Err(RegistrationError::DuplicateService { .. })));
    assert!(matches!(
        registry.switch_variant("ghost", Variant::TRAINING),
        Err(RegistrationError::UnknownService { .. })
    ));
}

#[test]
fn invoker_honours_variant_override_and_active_switch() {
    let invoker = Invoker::builder()
        .registry(EndpointRegistry::from_table(loyalty_table()).unwrap())
        .build();

    let default = invoker.invoke("loyalty", ENROLL, "1.0.0", vec![]).unwrap();
    assert_eq!(text_of(&default), "default");

    let training = defer(|| invoker.invoke("loyalty", ENROLL, "1.0.0", vec![]))
        .with_variant(Variant::TRAINING)
        .execute()
        .unwrap();
    assert_eq!(text_of(&training), "training-override");

    invoker.registry().switch_variant("loyalty", Variant::TRAINING).unwrap();
    let switched = invoker.invoke("loyalty", ENROLL, "1.0.0", vec![]).unwrap();
    assert_eq!(text_of(&switched), "training-override");
}

#[test]
fn concurrent_readers_observe_a_consistent_variant() {
    let registry = Arc::new(EndpointRegistry::from_table(loyalty_table()).unwrap());
    thread::scope(|scope| {
        for _ in 0..4 {
            let registry = Arc::clone(&registry);
            scope.spawn(move || {
                for _ in 0..500 {
                    let resolution = registry.resolve_active("loyalty", ENROLL).unwrap();
                    let text = resolution.endpoint().handle(&[]).unwrap();
                    assert!(matches!(text_of(&text), "default" | "training-override"));
                }
            });
        }
        scope.spawn(|| {
            for round in 0..200 {
                let variant = if round % 2 == 0 { Variant::TRAINING } else { Variant::DEFAULT };
                registry.switch_variant("loyalty", variant).unwrap();
            }
        });
    });
    assert_eq!(registry.active_variant("loyalty"), Some(Variant::DEFAULT));
}
