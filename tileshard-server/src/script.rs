/// Gameplay hooks backed by an external scripting engine.
///
/// The real interpreter is a collaborator outside this crate; the server
/// holds whatever implementation it is given behind a single mutex and calls
/// it from the tick thread only, so implementations need `Send` but not
/// `Sync`.
pub trait ScriptHooks: Send {
    /// A player's move was applied this tick.
    fn on_player_moved(&mut self, player_id: u64, x: i16, y: i16, facing: u8);

    /// An opaque custom message from a client; the reply (if any) is sent
    /// back verbatim.
    fn process_custom_message(&mut self, _data: &[u8]) -> Option<Vec<u8>> {
        None
    }

    /// Hot-reload scripts without a server restart.
    fn reload(&mut self) {}
}

/// Stand-in used until a real engine is wired up.
#[derive(Debug, Default)]
pub struct NullScript;

impl ScriptHooks for NullScript {
    fn on_player_moved(&mut self, player_id: u64, x: i16, y: i16, facing: u8) {
        log::trace!("script: player {player_id} moved to ({x}, {y}) facing {facing}");
    }

    fn reload(&mut self) {
        log::info!("script: nothing to reload");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::ScriptHooks;

    /// Records move events into a shared buffer for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingScript {
        pub moves: Arc<Mutex<Vec<(u64, i16, i16, u8)>>>,
    }

    impl ScriptHooks for RecordingScript {
        fn on_player_moved(&mut self, player_id: u64, x: i16, y: i16, facing: u8) {
            self.moves.lock().unwrap().push((player_id, x, y, facing));
        }
    }
}
