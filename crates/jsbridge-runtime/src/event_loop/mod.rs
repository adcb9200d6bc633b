//! The event-loop bridge.
//!
//! One cooperative loop per script thread multiplexes heterogeneous native
//! waitables (timers, semaphores, message queues, byte streams) onto
//! script callbacks. Exactly one callback runs at a time, to completion;
//! the only reentry from inside a callback is `stop()` or cancelling a
//! subscription.
//!
//! Every callback argument held across events is rooted through the
//! subscription's guard and released on exactly one of the two teardown
//! paths: explicit `cancel()` or module destruction. Cancelling a
//! timer-backed subscription only disarms the timer; its record survives
//! until module teardown so a firing that was already due can never
//! observe freed state.

mod contract;
mod waitable;

pub use contract::{Contract, ContractKind, EventDirection, TimerMode, Transformer};
pub use waitable::{ByteStream, MessageQueue, Semaphore};

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use jsbridge_core::{
    parse_args, CallContext, Engine, EnumVariant, EnumWidth, ForeignPtr, JsError, JsResult,
    JsVal, NativeFn, OutSlot, RootGuard, ValueDeclaration, ValueKind, WaitOutcome,
};

use crate::registry::{ModuleDescriptor, ModuleInstance, ModuleRegistry};

/// Leading argument slots every callback receives: the subscription object
/// and the per-event payload.
const SYSTEM_ARGS: usize = 2;

struct TimerState {
    mode: TimerMode,
    interval: Duration,
    deadline: Instant,
    armed: bool,
}

enum EventSource {
    Timer(TimerState),
    Semaphore {
        semaphore: Rc<Semaphore>,
        direction: EventDirection,
        transformer: Option<Transformer>,
    },
    Queue {
        queue: Rc<MessageQueue>,
        direction: EventDirection,
        transformer: Transformer,
    },
    Stream {
        stream: Rc<ByteStream>,
        transformer: Transformer,
    },
}

struct Subscription {
    id: u64,
    source: EventSource,
    callback: JsVal,
    /// Script-visible subscription object, also args slot 0.
    object: JsVal,
    /// `[object, payload, passthrough...]`.
    args: Vec<JsVal>,
    guard: RootGuard,
    cancelled: bool,
}

struct LoopState {
    subscriptions: Vec<Rc<RefCell<Subscription>>>,
    /// Contracts whose underlying primitive the bridge itself allocated
    /// (timers, ad-hoc queues) and must free at teardown.
    owned_contracts: Vec<Rc<Contract>>,
    running: bool,
    stop_requested: bool,
    next_id: u64,
}

/// Handle to one script thread's event loop. Clones share state.
#[derive(Clone)]
pub struct EventLoop {
    state: Rc<RefCell<LoopState>>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(LoopState {
                subscriptions: Vec::new(),
                owned_contracts: Vec::new(),
                running: false,
                stop_requested: false,
                next_id: 0,
            })),
        }
    }

    /// Record a contract the bridge allocated itself, to be freed by kind
    /// at module teardown.
    pub fn adopt_contract(&self, contract: Rc<Contract>) {
        self.state.borrow_mut().owned_contracts.push(contract);
    }

    /// Bind `callback` to `contract`. Returns the script-visible
    /// subscription object, which exposes `cancel()`.
    ///
    /// `passthrough` seeds argument slots 2+; those values stay rooted for
    /// the subscription's lifetime and are rewritten only by a callback
    /// returning an array of exactly their count.
    pub fn subscribe(
        &self,
        engine: &mut Engine,
        contract: &Rc<Contract>,
        callback: JsVal,
        passthrough: &[JsVal],
    ) -> JsResult<JsVal> {
        let id = {
            let mut st = self.state.borrow_mut();
            st.next_id += 1;
            st.next_id
        };

        let object = engine.mk_object();
        let state = Rc::clone(&self.state);
        let cancel = engine.mk_function(NativeFn::new(
            move |_engine: &mut Engine, _ctx: &mut CallContext| {
                cancel_subscription(&state, id);
                Ok(())
            },
        ));
        engine.set_field(object, "cancel", cancel)?;

        let source = match &contract.kind {
            ContractKind::Timer { mode, interval } => EventSource::Timer(TimerState {
                mode: *mode,
                interval: *interval,
                deadline: Instant::now() + *interval,
                armed: true,
            }),
            ContractKind::Semaphore {
                semaphore,
                direction,
                transformer,
            } => EventSource::Semaphore {
                semaphore: Rc::clone(semaphore),
                direction: *direction,
                transformer: transformer.clone(),
            },
            ContractKind::Queue {
                queue,
                direction,
                transformer,
            } => EventSource::Queue {
                queue: Rc::clone(queue),
                direction: *direction,
                transformer: transformer.clone(),
            },
            ContractKind::Stream { stream, transformer } => EventSource::Stream {
                stream: Rc::clone(stream),
                transformer: transformer.clone(),
            },
        };

        let mut guard = engine.root_guard();
        guard.own(object);
        guard.own(callback);
        let mut args = vec![object, JsVal::Undefined];
        for &extra in passthrough {
            guard.own(extra);
            args.push(extra);
        }

        trace!(id, passthrough = passthrough.len(), "subscribed");
        self.state
            .borrow_mut()
            .subscriptions
            .push(Rc::new(RefCell::new(Subscription {
                id,
                source,
                callback,
                object,
                args,
                guard,
                cancelled: false,
            })));
        Ok(object)
    }

    /// Ask a running loop to return after the current callback.
    pub fn request_stop(&self) {
        self.state.borrow_mut().stop_requested = true;
    }

    /// Drive the loop until stop, idle exhaustion, or a callback error.
    ///
    /// Events are delivered first-ready-first-served in subscription
    /// order. A callback error is not retried; it stops the loop and
    /// propagates. When nothing is ready and no armed timer remains, the
    /// loop returns: no other thread can make a waitable ready.
    pub fn run(&self, engine: &mut Engine) -> JsResult<()> {
        {
            let mut st = self.state.borrow_mut();
            if st.running {
                return Err(JsError::Internal("event loop is already running".into()));
            }
            st.running = true;
            st.stop_requested = false;
        }
        let result = self.run_inner(engine);
        self.state.borrow_mut().running = false;
        result
    }

    fn run_inner(&self, engine: &mut Engine) -> JsResult<()> {
        loop {
            if engine.poll_stop() || self.state.borrow().stop_requested {
                return Ok(());
            }

            let (ready, nearest_deadline) = self.scan_ready();
            match ready {
                Some((subscription, transformer)) => {
                    self.dispatch(engine, subscription, transformer)?;
                    // No native call is on the stack between callbacks;
                    // anything the callback made and did not root is garbage.
                    engine.collect();
                }
                None => match nearest_deadline {
                    Some(deadline) => {
                        let timeout = deadline.saturating_duration_since(Instant::now());
                        if engine.delay(timeout) == WaitOutcome::Stopped {
                            return Ok(());
                        }
                    }
                    // Nothing subscribed can ever become ready again.
                    None => return Ok(()),
                },
            }
        }
    }

    /// First ready subscription in order, plus the nearest armed timer
    /// deadline for the idle wait. A ready timer is rearmed (periodic) or
    /// disarmed (oneshot) here, before its callback runs.
    #[allow(clippy::type_complexity)]
    fn scan_ready(
        &self,
    ) -> (
        Option<(Rc<RefCell<Subscription>>, Option<Transformer>)>,
        Option<Instant>,
    ) {
        let st = self.state.borrow();
        let now = Instant::now();
        let mut nearest: Option<Instant> = None;
        for sub_rc in &st.subscriptions {
            let mut sub = sub_rc.borrow_mut();
            if sub.cancelled {
                continue;
            }
            let plan: Option<Option<Transformer>> = match &mut sub.source {
                EventSource::Timer(timer) => {
                    if !timer.armed {
                        continue;
                    }
                    if timer.deadline <= now {
                        match timer.mode {
                            TimerMode::Periodic => timer.deadline += timer.interval,
                            TimerMode::OneShot => timer.armed = false,
                        }
                        Some(None)
                    } else {
                        nearest = Some(nearest.map_or(timer.deadline, |d| d.min(timer.deadline)));
                        None
                    }
                }
                EventSource::Semaphore {
                    semaphore,
                    direction,
                    transformer,
                } => {
                    let is_ready = match direction {
                        EventDirection::In => semaphore.try_acquire(),
                        EventDirection::Out => semaphore.has_room(),
                    };
                    is_ready.then(|| transformer.clone())
                }
                EventSource::Queue {
                    queue,
                    direction,
                    transformer,
                } => {
                    let is_ready = match direction {
                        EventDirection::In => !queue.is_empty(),
                        EventDirection::Out => queue.has_room(),
                    };
                    is_ready.then(|| Some(transformer.clone()))
                }
                EventSource::Stream { stream, transformer } => {
                    (!stream.is_empty()).then(|| Some(transformer.clone()))
                }
            };
            if let Some(transformer) = plan {
                return (Some((Rc::clone(sub_rc), transformer)), nearest);
            }
        }
        (None, nearest)
    }

    /// Invoke one subscription's callback, then apply the passthrough
    /// replacement rule to its argument buffer.
    fn dispatch(
        &self,
        engine: &mut Engine,
        subscription: Rc<RefCell<Subscription>>,
        transformer: Option<Transformer>,
    ) -> JsResult<()> {
        let payload = match transformer {
            Some(transform) => transform(engine)?,
            None => JsVal::Undefined,
        };
        // Rooted for the duration of the call; the subscription buffer
        // only holds it until the next event overwrites slot 1.
        let mut payload_guard = engine.root_guard();
        payload_guard.own(payload);

        let (callback, object, args) = {
            let mut sub = subscription.borrow_mut();
            sub.args[1] = payload;
            (sub.callback, sub.object, sub.args.clone())
        };

        let returned = engine.apply(callback, object, &args)?;

        let passthrough_len = args.len() - SYSTEM_ARGS;
        if passthrough_len > 0 && engine.is_array(returned) {
            let returned_len = engine.array_len(returned).unwrap_or(0);
            if returned_len == passthrough_len {
                let mut sub = subscription.borrow_mut();
                for i in 0..passthrough_len {
                    let new_value = engine.array_get(returned, i);
                    let old_value = sub.args[SYSTEM_ARGS + i];
                    sub.guard.own(new_value);
                    sub.guard.disown(old_value);
                    sub.args[SYSTEM_ARGS + i] = new_value;
                }
            } else {
                debug!(
                    expected = passthrough_len,
                    returned = returned_len,
                    "callback array length does not match the passthrough slots; leaving them unchanged"
                );
            }
        }
        // The payload root drops with `payload_guard`; clear the slot so the
        // buffer never holds a handle a collection may have freed.
        subscription.borrow_mut().args[1] = JsVal::Undefined;
        Ok(())
    }

    /// Module teardown: drop every subscription (releasing its rooted
    /// argument buffer) and free each bridge-owned contract according to
    /// its kind.
    pub fn destroy(&self, _engine: &mut Engine) {
        let (subscriptions, contracts) = {
            let mut st = self.state.borrow_mut();
            (
                std::mem::take(&mut st.subscriptions),
                std::mem::take(&mut st.owned_contracts),
            )
        };
        drop(subscriptions);
        for contract in contracts {
            match &contract.kind {
                ContractKind::Timer { .. } => {}
                ContractKind::Semaphore { .. } => {}
                ContractKind::Queue { queue, .. } => queue.clear(),
                ContractKind::Stream { .. } => {}
            }
        }
    }

    #[cfg(test)]
    fn subscription_count(&self) -> usize {
        self.state.borrow().subscriptions.len()
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancel path shared by the script-visible `cancel()` binding.
///
/// Timer subscriptions are only disarmed; their record (and its roots)
/// survives until module teardown. Everything else unsubscribes and
/// releases immediately.
fn cancel_subscription(state: &Rc<RefCell<LoopState>>, id: u64) {
    let mut st = state.borrow_mut();
    let Some(pos) = st.subscriptions.iter().position(|s| s.borrow().id == id) else {
        return;
    };
    let is_timer = matches!(st.subscriptions[pos].borrow().source, EventSource::Timer(_));
    if is_timer {
        let mut sub = st.subscriptions[pos].borrow_mut();
        if let EventSource::Timer(timer) = &mut sub.source {
            timer.armed = false;
        }
        sub.cancelled = true;
        trace!(id, "timer subscription disarmed; teardown deferred");
    } else {
        st.subscriptions.remove(pos);
        trace!(id, "subscription cancelled");
    }
}

// ============================================================================
// Module bindings
// ============================================================================

/// Name other modules use to find the loop through the registry.
pub const MODULE_NAME: &str = "event_loop";

/// The `event_loop` module descriptor.
pub fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor {
        name: "event_loop",
        construct: construct_module,
        destroy: Some(destroy_module),
    }
}

fn construct_module(
    engine: &mut Engine,
    _registry: &Rc<RefCell<ModuleRegistry>>,
) -> JsResult<ModuleInstance> {
    let event_loop = EventLoop::new();
    let object = engine.mk_object();
    install_bindings(engine, object, &event_loop)?;
    Ok(ModuleInstance {
        object,
        state: Some(Rc::new(event_loop) as Rc<dyn Any>),
    })
}

fn destroy_module(engine: &mut Engine, state: &Rc<dyn Any>) {
    if let Some(event_loop) = state.downcast_ref::<EventLoop>() {
        event_loop.destroy(engine);
    }
}

static TIMER_MODES: [EnumVariant; 2] = [
    EnumVariant { name: "periodic", value: 0 },
    EnumVariant { name: "oneshot", value: 1 },
];

static SUBSCRIBE_ARGS: [ValueDeclaration; 2] = [
    ValueDeclaration::new(ValueKind::RawPointer),
    ValueDeclaration::new(ValueKind::Function),
];

static TIMER_ARGS: [ValueDeclaration; 2] = [
    ValueDeclaration::enumeration(EnumWidth::Four, &TIMER_MODES),
    ValueDeclaration::new(ValueKind::Int32),
];

static QUEUE_ARGS: [ValueDeclaration; 1] = [ValueDeclaration::new(ValueKind::Int32)];

fn install_bindings(engine: &mut Engine, object: JsVal, event_loop: &EventLoop) -> JsResult<()> {
    let bound = event_loop.clone();
    let subscribe = engine.mk_function(NativeFn::new(
        move |engine: &mut Engine, ctx: &mut CallContext| {
            let mut contract_ptr: Option<ForeignPtr> = None;
            let mut callback = JsVal::Undefined;
            parse_args(
                engine,
                ctx,
                &SUBSCRIBE_ARGS,
                &mut [OutSlot::Ptr(&mut contract_ptr), OutSlot::Value(&mut callback)],
            )?;
            let contract = contract_ptr
                .and_then(|p| p.downcast::<Contract>().ok())
                .ok_or_else(|| JsError::expected("event loop contract"))?;
            let passthrough = &ctx.args()[SYSTEM_ARGS..];
            let subscription = bound.subscribe(engine, &contract, callback, passthrough)?;
            ctx.set_return(subscription);
            Ok(())
        },
    ));
    engine.set_field(object, "subscribe", subscribe)?;

    let bound = event_loop.clone();
    let run = engine.mk_function(NativeFn::new(
        move |engine: &mut Engine, _ctx: &mut CallContext| bound.run(engine),
    ));
    engine.set_field(object, "run", run)?;

    let bound = event_loop.clone();
    let stop = engine.mk_function(NativeFn::new(
        move |_engine: &mut Engine, _ctx: &mut CallContext| {
            bound.request_stop();
            Ok(())
        },
    ));
    engine.set_field(object, "stop", stop)?;

    let bound = event_loop.clone();
    let timer = engine.mk_function(NativeFn::new(
        move |engine: &mut Engine, ctx: &mut CallContext| {
            let mut mode = 0u32;
            let mut interval_ms = 0i32;
            parse_args(
                engine,
                ctx,
                &TIMER_ARGS,
                &mut [OutSlot::Enum32(&mut mode), OutSlot::Int32(&mut interval_ms)],
            )?;
            if interval_ms < 0 {
                let err = JsError::BadArgs("interval must not be negative".into());
                engine.set_error(err.clone());
                return Err(err);
            }
            let mode = if mode == 0 { TimerMode::Periodic } else { TimerMode::OneShot };
            let contract = Contract::timer(mode, Duration::from_millis(interval_ms as u64));
            bound.adopt_contract(Rc::clone(&contract));
            let foreign = engine.mk_foreign(contract as Rc<dyn Any>);
            ctx.set_return(foreign);
            Ok(())
        },
    ));
    engine.set_field(object, "timer", timer)?;

    let bound = event_loop.clone();
    let queue = engine.mk_function(NativeFn::new(
        move |engine: &mut Engine, ctx: &mut CallContext| {
            let mut capacity = 0i32;
            parse_args(engine, ctx, &QUEUE_ARGS, &mut [OutSlot::Int32(&mut capacity)])?;
            if capacity <= 0 {
                let err = JsError::BadArgs("capacity must be positive".into());
                engine.set_error(err.clone());
                return Err(err);
            }
            let queue = Rc::new(MessageQueue::new(engine, capacity as usize));

            let draining = Rc::clone(&queue);
            let transformer: Transformer = Rc::new(move |_engine: &mut Engine| {
                Ok(draining.receive().unwrap_or(JsVal::Undefined))
            });
            let contract = Contract::queue(Rc::clone(&queue), EventDirection::In, transformer);
            bound.adopt_contract(Rc::clone(&contract));

            let result = engine.mk_object();
            let input = engine.mk_foreign(contract as Rc<dyn Any>);
            engine.set_field(result, "input", input)?;
            let sending = Rc::clone(&queue);
            let send = engine.mk_function(NativeFn::new(
                move |_engine: &mut Engine, ctx: &mut CallContext| {
                    let accepted = sending.send(ctx.arg(0));
                    ctx.set_return(JsVal::Bool(accepted));
                    Ok(())
                },
            ));
            engine.set_field(result, "send", send)?;
            ctx.set_return(result);
            Ok(())
        },
    ));
    engine.set_field(object, "queue", queue)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn make_queue_contract(engine: &Engine) -> (Rc<MessageQueue>, Rc<Contract>) {
        let queue = Rc::new(MessageQueue::new(engine, 4));
        let draining = Rc::clone(&queue);
        let transformer: Transformer =
            Rc::new(move |_: &mut Engine| Ok(draining.receive().unwrap_or(JsVal::Undefined)));
        let contract = Contract::queue(Rc::clone(&queue), EventDirection::In, transformer);
        (queue, contract)
    }

    fn counting_callback(engine: &mut Engine, count: Rc<Cell<u32>>) -> JsVal {
        engine.mk_function(NativeFn::new(
            move |_: &mut Engine, _: &mut CallContext| {
                count.set(count.get() + 1);
                Ok(())
            },
        ))
    }

    #[test]
    fn cancel_before_any_event_leaves_no_roots_and_no_calls() {
        let mut engine = Engine::new();
        let event_loop = EventLoop::new();
        let (_queue, contract) = make_queue_contract(&engine);
        let count = Rc::new(Cell::new(0u32));
        let callback = counting_callback(&mut engine, Rc::clone(&count));

        let subscription = event_loop
            .subscribe(&mut engine, &contract, callback, &[])
            .unwrap();
        assert!(engine.live_root_count() > 0);

        let cancel = engine.get_field(subscription, "cancel");
        engine.apply(cancel, subscription, &[]).unwrap();
        assert_eq!(event_loop.subscription_count(), 0);
        assert_eq!(engine.live_root_count(), 0);

        event_loop.run(&mut engine).unwrap();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn oneshot_timer_fires_exactly_once_then_loop_idles_out() {
        let mut engine = Engine::new();
        let event_loop = EventLoop::new();
        let contract = Contract::timer(TimerMode::OneShot, Duration::from_millis(1));
        let count = Rc::new(Cell::new(0u32));
        let callback = counting_callback(&mut engine, Rc::clone(&count));
        event_loop
            .subscribe(&mut engine, &contract, callback, &[])
            .unwrap();
        event_loop.run(&mut engine).unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn periodic_timer_reschedules_until_stopped() {
        let mut engine = Engine::new();
        let event_loop = EventLoop::new();
        let contract = Contract::timer(TimerMode::Periodic, Duration::from_millis(1));
        let count = Rc::new(Cell::new(0u32));
        let stopper = event_loop.clone();
        let counter = Rc::clone(&count);
        let callback = engine.mk_function(NativeFn::new(
            move |_: &mut Engine, _: &mut CallContext| {
                counter.set(counter.get() + 1);
                if counter.get() == 3 {
                    stopper.request_stop();
                }
                Ok(())
            },
        ));
        event_loop
            .subscribe(&mut engine, &contract, callback, &[])
            .unwrap();
        event_loop.run(&mut engine).unwrap();
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn cancelled_timer_subscription_survives_until_destroy() {
        let mut engine = Engine::new();
        let event_loop = EventLoop::new();
        let contract = Contract::timer(TimerMode::Periodic, Duration::from_millis(1));
        let count = Rc::new(Cell::new(0u32));
        let callback = counting_callback(&mut engine, Rc::clone(&count));
        let subscription = event_loop
            .subscribe(&mut engine, &contract, callback, &[])
            .unwrap();

        let cancel = engine.get_field(subscription, "cancel");
        engine.apply(cancel, subscription, &[]).unwrap();

        // Record kept, timer disarmed.
        assert_eq!(event_loop.subscription_count(), 1);
        assert!(engine.live_root_count() > 0);
        event_loop.run(&mut engine).unwrap();
        assert_eq!(count.get(), 0);

        event_loop.destroy(&mut engine);
        assert_eq!(event_loop.subscription_count(), 0);
        assert_eq!(engine.live_root_count(), 0);
    }

    #[test]
    fn queue_events_deliver_payloads_in_order() {
        let mut engine = Engine::new();
        let event_loop = EventLoop::new();
        let (queue, contract) = make_queue_contract(&engine);
        let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let callback = engine.mk_function(NativeFn::new(
            move |engine: &mut Engine, ctx: &mut CallContext| {
                sink.borrow_mut().push(engine.to_display_string(ctx.arg(1)));
                Ok(())
            },
        ));
        event_loop
            .subscribe(&mut engine, &contract, callback, &[])
            .unwrap();

        let first = engine.mk_string("first");
        let second = engine.mk_string("second");
        assert!(queue.send(first));
        assert!(queue.send(second));
        event_loop.run(&mut engine).unwrap();
        assert_eq!(*seen.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn passthrough_slots_replaced_only_on_exact_length_match() {
        let mut engine = Engine::new();
        let event_loop = EventLoop::new();
        let contract = Contract::timer(TimerMode::Periodic, Duration::from_millis(1));
        let observed: Rc<RefCell<Vec<(f64, f64)>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&observed);
        let fires = Rc::new(Cell::new(0u32));
        let fired = Rc::clone(&fires);
        let stopper = event_loop.clone();
        let callback = engine.mk_function(NativeFn::new(
            move |engine: &mut Engine, ctx: &mut CallContext| {
                let a = engine.get_double(ctx.arg(2)).unwrap();
                let b = engine.get_double(ctx.arg(3)).unwrap();
                sink.borrow_mut().push((a, b));
                fired.set(fired.get() + 1);
                match fired.get() {
                    1 => {
                        // Exact length: replaces both slots.
                        let next = engine.mk_array(vec![JsVal::Number(a + 10.0), JsVal::Number(b + 10.0)]);
                        ctx.set_return(next);
                    }
                    2 => {
                        // Wrong length: slots stay as they are.
                        let next = engine.mk_array(vec![JsVal::Number(99.0)]);
                        ctx.set_return(next);
                    }
                    _ => stopper.request_stop(),
                }
                Ok(())
            },
        ));
        event_loop
            .subscribe(
                &mut engine,
                &contract,
                callback,
                &[JsVal::Number(1.0), JsVal::Number(2.0)],
            )
            .unwrap();
        event_loop.run(&mut engine).unwrap();
        assert_eq!(
            *observed.borrow(),
            vec![(1.0, 2.0), (11.0, 12.0), (11.0, 12.0)]
        );
    }

    #[test]
    fn callback_error_stops_the_loop_and_propagates() {
        let mut engine = Engine::new();
        let event_loop = EventLoop::new();
        let contract = Contract::timer(TimerMode::Periodic, Duration::from_millis(1));
        let callback = engine.mk_function(NativeFn::new(
            move |_: &mut Engine, _: &mut CallContext| {
                Err(JsError::Runtime("boom".into()))
            },
        ));
        event_loop
            .subscribe(&mut engine, &contract, callback, &[])
            .unwrap();
        let err = event_loop.run(&mut engine).unwrap_err();
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn semaphore_permits_drive_callbacks() {
        let mut engine = Engine::new();
        let event_loop = EventLoop::new();
        let semaphore = Rc::new(Semaphore::new(2, 4));
        let contract = Contract::semaphore(Rc::clone(&semaphore), EventDirection::In, None);
        let count = Rc::new(Cell::new(0u32));
        let callback = counting_callback(&mut engine, Rc::clone(&count));
        event_loop
            .subscribe(&mut engine, &contract, callback, &[])
            .unwrap();
        event_loop.run(&mut engine).unwrap();
        assert_eq!(count.get(), 2);
        assert_eq!(semaphore.available(), 0);
    }

    #[test]
    fn unrooted_callback_garbage_is_collected_between_events() {
        let mut engine = Engine::new();
        let event_loop = EventLoop::new();
        let contract = Contract::timer(TimerMode::Periodic, Duration::from_millis(1));
        let scratch: Rc<Cell<JsVal>> = Rc::new(Cell::new(JsVal::Undefined));
        let hole = Rc::clone(&scratch);
        let fires = Rc::new(Cell::new(0u32));
        let fired = Rc::clone(&fires);
        let stopper = event_loop.clone();
        let callback = engine.mk_function(NativeFn::new(
            move |engine: &mut Engine, _: &mut CallContext| {
                fired.set(fired.get() + 1);
                if fired.get() == 1 {
                    hole.set(engine.mk_string("scratch"));
                } else {
                    stopper.request_stop();
                }
                Ok(())
            },
        ));
        event_loop
            .subscribe(&mut engine, &contract, callback, &[])
            .unwrap();
        event_loop.run(&mut engine).unwrap();
        // The string was never rooted, so it did not survive the
        // collection after its callback returned.
        assert_eq!(engine.to_display_string(scratch.get()), "undefined");
    }

    #[test]
    fn destroying_with_pending_queue_messages_releases_their_roots() {
        let mut engine = Engine::new();
        let event_loop = EventLoop::new();
        let (queue, contract) = make_queue_contract(&engine);
        event_loop.adopt_contract(Rc::clone(&contract));
        let v = engine.mk_string("pending");
        assert!(queue.send(v));
        assert_eq!(engine.live_root_count(), 1);
        event_loop.destroy(&mut engine);
        assert_eq!(engine.live_root_count(), 0);
    }
}
