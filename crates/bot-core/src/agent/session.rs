use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::observation::Vec3;
use super::r#loop::Recipient;
use super::tools::Selection;

/// Holder for at most one running task of a concern. Replacing aborts the previous task.
#[derive(Debug, Default)]
pub struct TaskSlot {
    handle: Option<JoinHandle<()>>,
}

impl TaskSlot {
    pub fn replace(&mut self, handle: JoinHandle<()>) {
        if let Some(old) = self.handle.replace(handle) {
            old.abort();
        }
    }

    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(old) => {
                let was_running = !old.is_finished();
                old.abort();
                was_running
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Continuous concerns with their own task slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concern {
    Follow,
    Combat,
    Stay,
    /// Multi-step world work such as collecting or digging.
    Work,
    Defense,
    Idle,
}

pub enum ContainerOp {
    Deposit(Selection),
    Withdraw(Selection),
    /// Reports the container contents through the channel.
    View(oneshot::Sender<String>),
}

pub struct ContainerRequest {
    pub op: ContainerOp,
    pub requested_by: Recipient,
}

/// Pending container requests, drained strictly in arrival order by a single drain loop.
#[derive(Default)]
pub struct ContainerQueue {
    pending: VecDeque<ContainerRequest>,
    draining: bool,
}

impl ContainerQueue {
    /// Appends a request. Returns true when the caller must start the drain loop.
    pub fn enqueue(&mut self, request: ContainerRequest) -> bool {
        self.pending.push_back(request);
        if self.draining {
            false
        } else {
            self.draining = true;
            true
        }
    }

    /// Next request for the drain loop; marks the queue idle once empty.
    pub fn next_request(&mut self) -> Option<ContainerRequest> {
        let next = self.pending.pop_front();
        if next.is_none() {
            self.draining = false;
        }
        next
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.draining = false;
    }
}

#[derive(Default)]
pub struct SessionState {
    pub saved_places: BTreeMap<String, Vec3>,
    pub following: Option<String>,
    pub defense_target: Option<u32>,
    pub containers: ContainerQueue,
    pub crafting: bool,
    pub eating: bool,
    pub distress_announced: bool,
    pub death_position: Option<Vec3>,
    follow: TaskSlot,
    combat: TaskSlot,
    stay: TaskSlot,
    work: TaskSlot,
    defense: TaskSlot,
    idle: TaskSlot,
    behaviors: Vec<JoinHandle<()>>,
}

impl SessionState {
    pub fn slot(&mut self, concern: Concern) -> &mut TaskSlot {
        match concern {
            Concern::Follow => &mut self.follow,
            Concern::Combat => &mut self.combat,
            Concern::Stay => &mut self.stay,
            Concern::Work => &mut self.work,
            Concern::Defense => &mut self.defense,
            Concern::Idle => &mut self.idle,
        }
    }

    pub fn is_active(&self, concern: Concern) -> bool {
        match concern {
            Concern::Follow => self.follow.is_active(),
            Concern::Combat => self.combat.is_active(),
            Concern::Stay => self.stay.is_active(),
            Concern::Work => self.work.is_active(),
            Concern::Defense => self.defense.is_active(),
            Concern::Idle => self.idle.is_active(),
        }
    }

    pub fn replace_task(&mut self, concern: Concern, handle: JoinHandle<()>) {
        self.slot(concern).replace(handle);
    }

    /// Cancels every running continuous action, including a defense pursuit. Passive
    /// behaviors keep running. Returns how many were cancelled.
    pub fn cancel_continuous(&mut self) -> usize {
        self.following = None;
        self.defense_target = None;
        [
            Concern::Follow,
            Concern::Combat,
            Concern::Stay,
            Concern::Work,
            Concern::Defense,
        ]
        .into_iter()
        .filter(|c| self.slot(*c).cancel())
        .count()
    }

    pub fn add_behavior(&mut self, handle: JoinHandle<()>) {
        self.behaviors.push(handle);
    }

    /// Disconnect teardown: every task stops, durable state (saved places) survives.
    pub fn teardown(&mut self) {
        self.cancel_continuous();
        self.idle.cancel();
        for handle in self.behaviors.drain(..) {
            handle.abort();
        }
        self.containers.reset();
        self.crafting = false;
        self.eating = false;
        self.death_position = None;
    }
}

/// Per-agent state shared by every handler and behavior of that agent.
///
/// The lock is never held across an await point.
#[derive(Default)]
pub struct Session {
    state: Mutex<SessionState>,
}

impl Session {
    pub fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Process-lifetime sessions keyed by agent name.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn get_or_create(&self, agent: &str) -> Arc<Session> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions.entry(agent.to_string()).or_default().clone()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
