//! Nested dispatch and registry mutation while a call is in flight.

mod common;

use common::{Rig, key};
use splice::{
    BoxError, Dispatcher, InvocationContext, IsolationSupervisor, Module, Phase, Value,
};
use std::sync::{Arc, Mutex, OnceLock};

/// Replaces `Deck::draw` by dispatching `Deck::shuffle` and counting its result.
#[derive(Clone)]
struct NestingModule {
    dispatcher: Arc<OnceLock<Arc<Dispatcher>>>,
    inner: Arc<Mutex<Vec<Value>>>,
}

impl Module for NestingModule {
    fn wants_to_replace(&self, ctx: &InvocationContext<'_>) -> Result<bool, BoxError> {
        Ok(ctx.method().method() == "draw")
    }

    fn replace_method(&self, _ctx: &InvocationContext<'_>) -> Result<Value, BoxError> {
        let dispatcher = self.dispatcher.get().ok_or("dispatcher not wired")?;
        let key = "Deck::shuffle".parse()?;
        let shuffled = dispatcher.intercept(InvocationContext::new(&key, &[]), |_| {
            Ok(Value::from("shuffled"))
        })?;
        self.inner.lock().unwrap().push(shuffled.clone());
        Ok(Value::List(vec![shuffled]))
    }
}

#[test]
fn modules_can_dispatch_nested_calls() {
    let rig = Rig::new();
    let nesting = NestingModule {
        dispatcher: Arc::new(OnceLock::new()),
        inner: Arc::default(),
    };
    let _ = nesting.dispatcher.set(rig.dispatcher.clone());
    rig.load_custom("nesting", nesting.clone(), &["Deck::draw", "Deck::shuffle"]);
    rig.load("observer", rig.module("observer").rewriting("observed"), &["Deck::shuffle"]);

    let (result, originals) = rig.call("Deck::draw");

    assert_eq!(
        result.unwrap(),
        Value::List(vec![Value::from("observed")])
    );
    assert_eq!(originals, 0);
    assert_eq!(*nesting.inner.lock().unwrap(), vec![Value::from("observed")]);
    assert_eq!(rig.order(), vec!["nesting", "observer"]);
}

/// Quarantines another module from inside its before hook.
#[derive(Clone)]
struct Evictor {
    supervisor: Arc<OnceLock<Arc<IsolationSupervisor>>>,
    target: &'static str,
}

impl Module for Evictor {
    fn before_invoke(&self, _ctx: &InvocationContext<'_>) -> Result<(), BoxError> {
        let supervisor = self.supervisor.get().ok_or("supervisor not wired")?;
        supervisor.quarantine([self.target]);
        Ok(())
    }
}

#[test]
fn modules_unloaded_mid_call_are_skipped() {
    let rig = Rig::new();
    let evictor = Evictor {
        supervisor: Arc::new(OnceLock::new()),
        target: "victim",
    };
    let _ = evictor.supervisor.set(rig.supervisor.clone());
    rig.load_custom("evictor", evictor, &["Deck::draw"]);
    let victim = rig.module("victim");
    rig.load("victim", victim.clone(), &["Deck::draw"]);

    let (result, _) = rig.call("Deck::draw");

    assert_eq!(result.unwrap(), Value::from("original"));
    assert_eq!(victim.calls(Phase::Election), 1);
    assert_eq!(victim.calls(Phase::Before), 0);
    assert_eq!(victim.calls(Phase::After), 0);
    assert_eq!(rig.order(), vec!["evictor"]);
}

#[test]
fn nested_fault_quarantines_inside_the_inner_call() {
    let rig = Rig::new();
    let nesting = NestingModule {
        dispatcher: Arc::new(OnceLock::new()),
        inner: Arc::default(),
    };
    let _ = nesting.dispatcher.set(rig.dispatcher.clone());
    rig.load_custom("nesting", nesting, &["Deck::draw"]);
    let flaky = rig.module("flaky").failing_in(Phase::Before);
    rig.load("flaky", flaky.clone(), &["Deck::shuffle"]);

    let (result, _) = rig.call("Deck::draw");

    assert_eq!(result.unwrap(), Value::List(vec![Value::from("shuffled")]));
    assert_eq!(flaky.calls(Phase::Before), 1);
    assert_eq!(rig.order(), vec!["nesting"]);

    let key = key("Deck::shuffle");
    let again = rig
        .dispatcher
        .intercept(InvocationContext::new(&key, &[]), |_| Ok(Value::Unit))
        .unwrap();
    assert_eq!(again, Value::Unit);
    assert_eq!(flaky.calls(Phase::Before), 1);
}
