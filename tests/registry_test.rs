use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use asset_loom::error::{AssemblyError, LoadError};
use asset_loom::parts::{CompositeKey, FetchDecision, PartCache, PartKind, PartRef};
use asset_loom::registry::{ArtifactCache, CallbackPair, RequestRegistry};

#[test]
fn part_cache_never_issues_twice() {
    let mut cache = PartCache::new();
    let part = PartRef::new("geo/a");

    assert_eq!(cache.get_or_fetch(&part), FetchDecision::FetchStarted);
    assert!(cache.in_flight(&part));
    assert_eq!(cache.get_or_fetch(&part), FetchDecision::AlreadyInFlight);

    cache.complete(&part, Arc::from(b"G".to_vec()));
    assert!(cache.contains(&part));
    assert!(!cache.in_flight(&part));
    assert_eq!(cache.get_or_fetch(&part), FetchDecision::AlreadyCached);
}

#[test]
fn failed_part_may_be_fetched_again_later() {
    let mut cache = PartCache::new();
    let part = PartRef::new("tex/c");

    assert_eq!(cache.get_or_fetch(&part), FetchDecision::FetchStarted);
    cache.fail(&part);
    assert!(!cache.contains(&part));
    assert!(!cache.in_flight(&part));
    assert_eq!(cache.get_or_fetch(&part), FetchDecision::FetchStarted);
}

#[test]
fn composite_keys_compare_fieldwise() {
    let a = CompositeKey::new("geo/a", "mat/b", "tex/c");
    let b = CompositeKey::new("geo/a", "mat/b", "tex/c");
    let c = CompositeKey::new("geo/a", "mat/b", "tex/d");

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert!(a.references(PartKind::Image, &PartRef::new("tex/c")));
    assert!(!a.references(PartKind::Geometry, &PartRef::new("tex/c")));
    assert_eq!(a.part(PartKind::Material), &PartRef::new("mat/b"));
}

#[test]
fn registry_keeps_one_pending_request_per_key() {
    let mut registry: RequestRegistry<Vec<u8>> = RequestRegistry::new();
    let key = CompositeKey::new("geo/a", "mat/b", "tex/c");

    assert!(!registry.register(&key, CallbackPair::new(|_| {}, |_| {})));
    assert!(registry.register(&key, CallbackPair::new(|_| {}, |_| {})));
    assert_eq!(registry.len(), 1);

    let taken = registry.take_ready(|_| true);
    assert_eq!(taken.len(), 1);
    assert_eq!(taken[0].callers(), 2);
    assert!(registry.is_empty());
}

#[test]
fn success_dispatch_reaches_every_caller_in_order() {
    let mut registry: RequestRegistry<Vec<u8>> = RequestRegistry::new();
    let key = CompositeKey::new("geo/a", "mat/b", "tex/c");
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let calls = Arc::clone(&calls);
        registry.register(
            &key,
            CallbackPair::new(
                move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                },
                |_| panic!("unexpected failure"),
            ),
        );
    }

    let mut taken = registry.take_ready(|_| true);
    let request = taken.pop().expect("one pending request");
    request.dispatch_success(Arc::new(b"artifact".to_vec()));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn failure_dispatch_reaches_every_caller() {
    let mut registry: RequestRegistry<Vec<u8>> = RequestRegistry::new();
    let key = CompositeKey::new("geo/a", "mat/b", "tex/c");
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let calls = Arc::clone(&calls);
        registry.register(
            &key,
            CallbackPair::new(
                |_| panic!("unexpected success"),
                move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                },
            ),
        );
    }

    let failed = registry.take_referencing(PartKind::Material, &PartRef::new("mat/b"));
    assert_eq!(failed.len(), 1);
    for request in failed {
        request.dispatch_failure(LoadError::Assembly(AssemblyError("boom".to_owned())));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn image_ignorable_flags_only_matching_keys() {
    let mut registry: RequestRegistry<Vec<u8>> = RequestRegistry::new();
    let with_image = CompositeKey::new("geo/a", "mat/b", "tex/c");
    let other_image = CompositeKey::new("geo/a", "mat/b", "tex/d");

    registry.register(&with_image, CallbackPair::new(|_| {}, |_| {}));
    registry.register(&other_image, CallbackPair::new(|_| {}, |_| {}));

    assert_eq!(registry.mark_image_ignorable(&PartRef::new("tex/c")), 1);

    let ready = registry.take_ready(|request| request.image_ignorable());
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].key(), &with_image);
    assert_eq!(registry.len(), 1);
}

#[test]
fn take_referencing_removes_only_matching_keys() {
    let mut registry: RequestRegistry<Vec<u8>> = RequestRegistry::new();
    let one = CompositeKey::new("geo/a", "mat/b", "tex/c");
    let two = CompositeKey::new("geo/x", "mat/b", "tex/c");
    let three = CompositeKey::new("geo/x", "mat/y", "tex/c");

    registry.register(&one, CallbackPair::new(|_| {}, |_| {}));
    registry.register(&two, CallbackPair::new(|_| {}, |_| {}));
    registry.register(&three, CallbackPair::new(|_| {}, |_| {}));

    let failed = registry.take_referencing(PartKind::Material, &PartRef::new("mat/b"));
    assert_eq!(failed.len(), 2);
    assert_eq!(registry.len(), 1);
}

#[test]
fn artifact_cache_is_write_once_per_key() {
    let mut cache: ArtifactCache<Vec<u8>> = ArtifactCache::new();
    let key = CompositeKey::new("geo/a", "mat/b", "tex/c");

    let first = Arc::new(b"first".to_vec());
    let second = Arc::new(b"second".to_vec());

    let cached = cache.insert(key.clone(), Arc::clone(&first));
    assert!(Arc::ptr_eq(&cached, &first));

    // A second assembly for the same key must not overwrite the entry.
    let cached = cache.insert(key.clone(), second);
    assert!(Arc::ptr_eq(&cached, &first));
    assert_eq!(cache.len(), 1);

    let got = cache.get(&key).expect("cached artifact");
    assert!(Arc::ptr_eq(&got, &first));
}
