use tokio::sync::mpsc;

/// A request from a network worker to the tick worker.
///
/// Actions are values: they carry everything needed to execute without
/// reaching back into the session that produced them. The set is closed and
/// dispatch is explicit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Login {
        client_id: u64,
        username: String,
    },
    Logout {
        client_id: u64,
    },
    Move {
        client_id: u64,
        direction: u8,
        facing: u8,
    },
    Turn {
        client_id: u64,
        facing: u8,
    },
    Chat {
        client_id: u64,
        channel: u8,
        text: String,
    },
    Warp {
        client_id: u64,
        x: i16,
        y: i16,
    },
    SpawnBots {
        count: usize,
        clustered: bool,
    },
    RemoveBots,
}

/// Producer half of the network-to-tick bridge. Clone freely; pushes never
/// block. FIFO per producer; ordering across producers is unspecified.
#[derive(Clone, Debug)]
pub struct ActionQueue {
    tx: mpsc::UnboundedSender<Action>,
}

impl ActionQueue {
    pub fn push(&self, action: Action) {
        // The receiver only drops on shutdown; actions racing it are moot.
        let _ = self.tx.send(action);
    }
}

/// Consumer half, owned by the tick worker.
#[derive(Debug)]
pub struct ActionReceiver {
    rx: mpsc::UnboundedReceiver<Action>,
}

impl ActionReceiver {
    /// Moves everything currently enqueued into `buf` without blocking.
    pub fn drain_into(&mut self, buf: &mut Vec<Action>) {
        while let Ok(action) = self.rx.try_recv() {
            buf.push(action);
        }
    }
}

pub fn action_queue() -> (ActionQueue, ActionReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ActionQueue { tx }, ActionReceiver { rx })
}
