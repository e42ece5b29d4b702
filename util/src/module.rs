//! Cyclic processing module interface
//!
//! Processing modules (like DriveCtrl) are initialised once, from a parameter file and the current
//! session, then called once per cycle with that cycle's input. A module reports what it did in a
//! status report alongside its output, so the executable can archive every cycle without knowing
//! the module's internals.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// MODULE STATE
// ---------------------------------------------------------------------------

/// The module's internal state.
pub trait State {
    /// Data required during initialisation, usually the parameter file name.
    type InitData;
    type InitError;

    /// Data required for one cycle of processing.
    type InputData;
    /// Demands produced by one cycle.
    type OutputData;
    /// What happened during the cycle, for logging and archiving.
    type StatusReport;
    type ProcError;

    /// Initialise the module.
    ///
    /// Archives should be opened inside the session's archive directory.
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>;

    /// Run one cycle of processing.
    ///
    /// Errors are reported per cycle, the module must remain usable for the next cycle.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>;
}

#[cfg(test)]
mod test {
    use super::*;

    /// Integrates its input, refusing negative inputs.
    #[derive(Default)]
    struct Accumulator {
        gain: f64,
        total: f64,
    }

    impl State for Accumulator {
        type InitData = f64;
        type InitError = ();
        type InputData = f64;
        type OutputData = f64;
        type StatusReport = bool;
        type ProcError = String;

        fn init(&mut self, init_data: f64, _session: &Session) -> Result<(), ()> {
            self.gain = init_data;
            Ok(())
        }

        fn proc(&mut self, input_data: &f64) -> Result<(f64, bool), String> {
            if *input_data < 0.0 {
                return Err(format!("negative input {}", input_data));
            }
            self.total += self.gain * input_data;
            Ok((self.total, self.total > 1.0))
        }
    }

    #[test]
    fn test_cycles_continue_after_error() {
        let session = Session {
            session_root: std::env::temp_dir(),
            arch_root: std::env::temp_dir(),
            log_file_path: std::env::temp_dir().join("module_test.log"),
        };

        let mut acc = Accumulator::default();
        acc.init(0.5, &session).unwrap();

        assert_eq!(acc.proc(&1.0), Ok((0.5, false)));
        assert!(acc.proc(&-1.0).is_err());
        assert_eq!(acc.proc(&2.0), Ok((1.5, true)));
    }
}
