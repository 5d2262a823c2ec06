//! Complete counter application demonstrating the store features together

use serde_json::{json, Value};
use statekit::{create_store, Getter, Setter, StoreEvent, StoreOptions};
use tracing_subscriber::EnvFilter;

struct CounterActions {
    set: Setter<Value>,
    get: Getter<Value>,
}

impl CounterActions {
    fn count(&self) -> i64 {
        self.get.read(|s| s["count"].as_i64().unwrap_or_default())
    }

    fn increment(&self) {
        self.set.update(|s| {
            json!({ "count": s["count"].as_i64().unwrap_or_default() + s["step"].as_i64().unwrap_or(1) })
        });
    }

    fn decrement(&self) {
        self.set.update(|s| {
            json!({ "count": s["count"].as_i64().unwrap_or_default() - s["step"].as_i64().unwrap_or(1) })
        });
    }

    fn set_step(&self, step: i64) {
        self.set.set(json!({ "step": step }));
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Complete Counter Application ===\n");

    println!("1. Initializing counter store");
    let store = create_store(
        json!({ "count": 0, "step": 1, "history": [0] }),
        |set, get| CounterActions { set, get },
        StoreOptions::new()
            .on_load(|state: &Value, _: &Setter<Value>| println!("   [Load] {state}"))
            // Derived field, written with the silent setter.
            .on_state_change(|state: &Value, set: &Setter<Value>| {
                let mut history = state["history"].as_array().cloned().unwrap_or_default();
                if history.last() != Some(&state["count"]) {
                    history.push(state["count"].clone());
                    set.set(json!({ "history": history }));
                }
            }),
    );

    store.add_event_listener(StoreEvent::Attach, |_, _| println!("   [Attach] first subscriber"));
    store.add_event_listener(StoreEvent::Detach, |_, _| println!("   [Detach] last subscriber left"));

    println!("\n2. Subscribing to changes");
    let probe = store.clone();
    let subscription = store.subscribe(move || {
        probe.read(|s| println!("   [State] Count: {}, Step: {}", s["count"], s["step"]));
    });

    println!("\n3. Incrementing");
    let actions = store.actions();
    actions.increment();
    actions.increment();
    actions.increment();

    println!("\n4. Changing step to 5");
    actions.set_step(5);
    actions.increment();
    actions.decrement();

    println!("\n5. History: {}", store.get()["history"]);
    println!("   Count via action: {}", actions.count());

    println!("\n6. Resetting");
    store.reset();

    println!("\n7. Unsubscribing");
    subscription.unsubscribe();
    actions.increment();
    println!("   Count after silent increment: {}", actions.count());

    println!("\n✓ Example complete!");
}
