//! Two "tabs" sharing durable storage stay in sync.
//!
//! Run with `RUST_LOG=statekit=debug` to see storage activity.

use serde_json::json;
use statekit::persist::{FileStorage, MemoryStorage};
use statekit::{create_persistent_store, Environment, PersistOptions, StorageKind};
use tracing_subscriber::EnvFilter;

fn main() -> statekit::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Persistent Store Example ===\n");

    let path = std::env::temp_dir().join("statekit-demo.json");
    let local = FileStorage::open(&path)?;
    println!("1. Local storage at {}", local.path().display());

    let tab_a = Environment::new()
        .with_local(local.clone())
        .with_session(MemoryStorage::new());
    let tab_b = Environment::new()
        .with_local(local)
        .with_session(MemoryStorage::new());

    let initial = json!({ "visits": 0, "theme": "light" });
    let store_a = create_persistent_store(&tab_a, "prefs", initial.clone(), |_, _| (), PersistOptions::new());
    let store_b = create_persistent_store(&tab_b, "prefs", initial, |_, _| (), PersistOptions::new());
    println!("   Loaded: {}", store_a.get());

    println!("\n2. Both tabs subscribe");
    let probe = store_b.clone();
    let _sub_a = store_a.subscribe(|| {});
    let _sub_b = store_b.subscribe(move || println!("   [Tab B] {}", probe.get()));

    println!("\n3. Tab A writes");
    store_a.update(|s| json!({ "visits": s["visits"].as_i64().unwrap_or_default() + 1 }));
    store_a.set(json!({ "theme": "dark" }));

    println!("\n4. Session storage is per tab");
    let draft_a = create_persistent_store(
        &tab_a,
        "draft",
        json!({ "text": "" }),
        |_, _| (),
        PersistOptions::new().storage(StorageKind::Session),
    );
    draft_a.set(json!({ "text": "unsent" }));
    let draft_b = create_persistent_store(
        &tab_b,
        "draft",
        json!({ "text": "" }),
        |_, _| (),
        PersistOptions::new().storage(StorageKind::Session),
    );
    println!("   Tab A draft: {}", draft_a.get());
    println!("   Tab B draft: {}", draft_b.get());

    println!("\n✓ Example complete! Run again to see visits grow.");
    Ok(())
}
