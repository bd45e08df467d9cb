//! Host-detection loop.
//!
//! One background thread waits on three events: the platform's USB
//! state-change event, the usermode timeout event, and the usermode exit
//! event. Any wake-up re-evaluates host presence and, when a host is
//! there, blocks inside `StartSession` until the companion application
//! answers — which can take as long as the user needs to start it. The
//! exit event interrupts that wait and is the only way to cancel it.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use log::{debug, info, warn};

use frankendump_platform::signal::wait_any;
use frankendump_platform::usb::host_available;

use crate::link::{LinkInner, LinkState};

/// Index of the exit event in the waited set.
const EXIT_EVENT: usize = 2;

pub(crate) fn run(inner: Arc<LinkInner>) {
    debug!("usb detection thread running");
    loop {
        let fired = wait_any(
            &[
                inner.server.state_change(),
                &inner.timeout_event,
                &inner.exit_event,
            ],
            None,
        );
        let Some(idx) = fired else { continue };

        let mut state = inner.gate.write();

        if idx == EXIT_EVENT {
            finish(&inner, &mut state);
            break;
        }

        // Re-evaluate host presence; any wake-up invalidates the session.
        state.host_available = host_available(inner.server.as_ref());
        state.session_started = false;
        state.remaining_transfer = 0;
        debug!(
            "usb state change: host {}",
            if state.host_available { "available" } else { "gone" }
        );

        if state.host_available {
            match inner.start_session(&mut state) {
                Ok(()) => {
                    state.session_started = true;
                    info!("usb session established");
                }
                Err(err) => {
                    if inner.exit_flag.load(Ordering::SeqCst) {
                        // The exit event interrupted the negotiation.
                        finish(&inner, &mut state);
                        break;
                    }
                    warn!("usb session negotiation failed: {err}");
                }
            }
        }
    }
    debug!("usb detection thread stopped");
}

/// Loop teardown, with the gate held: close an active session best-effort
/// and drop every session flag.
fn finish(inner: &LinkInner, state: &mut LinkState) {
    if state.host_available && state.session_started {
        inner.end_session(state);
    }
    state.host_available = false;
    state.session_started = false;
    state.remaining_transfer = 0;
    inner.exit_flag.store(false, Ordering::SeqCst);
}
