//! In-memory saga state machine.

use std::sync::Arc;

use common::SagaId;

use crate::state::SagaState;
use crate::step::SagaStep;

/// A rehydrated saga: snapshot state plus the step list for its type.
///
/// The instance is a transient value owned by whichever worker holds the
/// saga's outbox lease; it is never shared across workers. All mutation goes
/// through the guarded transition methods, and every mutator is a no-op once
/// a terminal state is reached.
pub struct SagaInstance<TData> {
    id: SagaId,
    state: SagaState,
    cursor: usize,
    data: TData,
    error_log: Vec<String>,
    steps: Vec<Arc<dyn SagaStep<TData>>>,
}

impl<TData> SagaInstance<TData> {
    /// Creates a fresh instance in `Created` at cursor 0.
    pub fn new(id: SagaId, data: TData, steps: Vec<Arc<dyn SagaStep<TData>>>) -> Self {
        Self {
            id,
            state: SagaState::Created,
            cursor: 0,
            data,
            error_log: Vec::new(),
            steps,
        }
    }

    /// Rebuilds an instance from a persisted snapshot.
    ///
    /// Applies the self-healing invariant: a forward snapshot whose cursor
    /// has passed the end of the step list is promoted to `Completed`.
    pub fn rehydrate(
        id: SagaId,
        state: SagaState,
        cursor: usize,
        data: TData,
        error_log: Vec<String>,
        steps: Vec<Arc<dyn SagaStep<TData>>>,
    ) -> Self {
        let state = if state.is_forward() && cursor >= steps.len() {
            SagaState::Completed
        } else {
            state
        };

        Self {
            id,
            state,
            cursor,
            data,
            error_log,
            steps,
        }
    }

    /// Returns the saga ID.
    pub fn id(&self) -> SagaId {
        self.id
    }

    /// Returns the current state.
    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Returns the forward cursor (index of the next step to execute).
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Returns the saga payload.
    pub fn data(&self) -> &TData {
        &self.data
    }

    /// Returns the accumulated error log, oldest first.
    pub fn error_log(&self) -> &[String] {
        &self.error_log
    }

    /// Returns the number of steps in this saga's type.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Returns the step under the cursor, or None when the cursor has
    /// passed the end of the list.
    pub fn current_step(&self) -> Option<Arc<dyn SagaStep<TData>>> {
        self.steps.get(self.cursor).cloned()
    }

    /// Returns the executed steps in reverse order of execution, newest
    /// first, as `(index, step)` pairs. Deterministic, so a resumed
    /// compensation re-examines the same sequence.
    pub fn executed_steps_reverse(&self) -> Vec<(usize, Arc<dyn SagaStep<TData>>)> {
        (0..self.cursor.min(self.steps.len()))
            .rev()
            .map(|index| (index, self.steps[index].clone()))
            .collect()
    }

    /// `Created` → `Running`.
    pub fn mark_running(&mut self) {
        if self.state == SagaState::Created {
            self.state = SagaState::Running;
        }
    }

    /// Moves the cursor past a successfully executed step; reaching the end
    /// of the list completes the saga.
    pub fn advance(&mut self) {
        if self.state != SagaState::Running {
            return;
        }
        self.cursor += 1;
        if self.cursor >= self.steps.len() {
            self.state = SagaState::Completed;
        }
    }

    /// `Running` → `Completed` without moving the cursor. Covers the
    /// zero-step saga, where there is nothing to advance past.
    pub fn complete(&mut self) {
        if self.state == SagaState::Running {
            self.state = SagaState::Completed;
        }
    }

    /// `Running` → `Failed`, recording the reason.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.state == SagaState::Running {
            self.state = SagaState::Failed;
            self.error_log.push(reason.into());
        }
    }

    /// `Failed` or `Running` → `Compensating`.
    pub fn mark_compensating(&mut self) {
        if matches!(self.state, SagaState::Failed | SagaState::Running) {
            self.state = SagaState::Compensating;
        }
    }

    /// `Compensating` → `Compensated`.
    pub fn mark_compensated(&mut self) {
        if self.state == SagaState::Compensating {
            self.state = SagaState::Compensated;
        }
    }

    /// `Compensating` → `FatalError`, recording the reason.
    pub fn mark_fatal(&mut self, reason: impl Into<String>) {
        if self.state == SagaState::Compensating {
            self.state = SagaState::FatalError;
            self.error_log.push(reason.into());
        }
    }

    /// Appends to the error log without a state transition. Used for
    /// compensation failures, which do not abort the compensation loop.
    pub fn record_error(&mut self, message: impl Into<String>) {
        if !self.state.is_terminal() {
            self.error_log.push(message.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepError;
    use async_trait::async_trait;
    use common::Shutdown;

    struct NoopStep(&'static str);

    #[async_trait]
    impl SagaStep<()> for NoopStep {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn execute(&self, _data: &(), _cancel: &Shutdown) -> Result<(), StepError> {
            Ok(())
        }

        async fn compensate(&self, _data: &(), _cancel: &Shutdown) -> Result<(), StepError> {
            Ok(())
        }
    }

    fn steps(names: &[&'static str]) -> Vec<Arc<dyn SagaStep<()>>> {
        names
            .iter()
            .map(|n| Arc::new(NoopStep(n)) as Arc<dyn SagaStep<()>>)
            .collect()
    }

    fn instance(names: &[&'static str]) -> SagaInstance<()> {
        SagaInstance::new(SagaId::new(), (), steps(names))
    }

    #[test]
    fn new_instance_starts_created_at_zero() {
        let saga = instance(&["a", "b"]);
        assert_eq!(saga.state(), SagaState::Created);
        assert_eq!(saga.cursor(), 0);
        assert!(saga.error_log().is_empty());
    }

    #[test]
    fn happy_path_transitions() {
        let mut saga = instance(&["a", "b"]);

        saga.mark_running();
        assert_eq!(saga.state(), SagaState::Running);

        assert_eq!(saga.current_step().unwrap().name(), "a");
        saga.advance();
        assert_eq!(saga.cursor(), 1);
        assert_eq!(saga.state(), SagaState::Running);

        assert_eq!(saga.current_step().unwrap().name(), "b");
        saga.advance();
        assert_eq!(saga.cursor(), 2);
        assert_eq!(saga.state(), SagaState::Completed);
        assert!(saga.current_step().is_none());
    }

    #[test]
    fn zero_step_saga_completes_directly() {
        let mut saga = instance(&[]);
        saga.mark_running();
        assert!(saga.current_step().is_none());

        saga.complete();
        assert_eq!(saga.state(), SagaState::Completed);
        assert_eq!(saga.cursor(), 0);
    }

    #[test]
    fn fail_records_reason_and_transitions() {
        let mut saga = instance(&["a", "b"]);
        saga.mark_running();
        saga.advance();

        saga.fail("step 'b' exploded");
        assert_eq!(saga.state(), SagaState::Failed);
        assert_eq!(saga.error_log(), &["step 'b' exploded"]);

        saga.mark_compensating();
        assert_eq!(saga.state(), SagaState::Compensating);
    }

    #[test]
    fn compensation_outcomes() {
        let mut saga = instance(&["a"]);
        saga.mark_running();
        saga.fail("boom");
        saga.mark_compensating();

        let mut fatal = instance(&["a"]);
        fatal.mark_running();
        fatal.fail("boom");
        fatal.mark_compensating();

        saga.mark_compensated();
        assert_eq!(saga.state(), SagaState::Compensated);

        fatal.mark_fatal("Manual review required");
        assert_eq!(fatal.state(), SagaState::FatalError);
        assert_eq!(fatal.error_log(), &["boom", "Manual review required"]);
    }

    #[test]
    fn executed_steps_reverse_yields_prefix_newest_first() {
        let mut saga = instance(&["a", "b", "c"]);
        saga.mark_running();
        saga.advance();
        saga.advance();

        let reversed: Vec<(usize, &'static str)> = saga
            .executed_steps_reverse()
            .into_iter()
            .map(|(i, s)| (i, s.name()))
            .collect();

        assert_eq!(reversed, vec![(1, "b"), (0, "a")]);
    }

    #[test]
    fn executed_steps_reverse_empty_before_first_advance() {
        let mut saga = instance(&["a", "b"]);
        saga.mark_running();
        assert!(saga.executed_steps_reverse().is_empty());
    }

    #[test]
    fn terminal_states_ignore_mutators() {
        let mut saga = instance(&["a"]);
        saga.mark_running();
        saga.advance();
        assert_eq!(saga.state(), SagaState::Completed);

        saga.fail("too late");
        saga.mark_compensating();
        saga.mark_running();
        saga.record_error("ignored");

        assert_eq!(saga.state(), SagaState::Completed);
        assert_eq!(saga.cursor(), 1);
        assert!(saga.error_log().is_empty());
    }

    #[test]
    fn advance_outside_running_is_ignored() {
        let mut saga = instance(&["a", "b"]);
        saga.advance();
        assert_eq!(saga.cursor(), 0);

        saga.mark_running();
        saga.fail("boom");
        saga.advance();
        assert_eq!(saga.cursor(), 0);
    }

    #[test]
    fn rehydrate_heals_forward_cursor_past_end() {
        let saga = SagaInstance::rehydrate(
            SagaId::new(),
            SagaState::Running,
            2,
            (),
            Vec::new(),
            steps(&["a", "b"]),
        );
        assert_eq!(saga.state(), SagaState::Completed);
    }

    #[test]
    fn rehydrate_keeps_non_forward_state_past_end() {
        let saga = SagaInstance::rehydrate(
            SagaId::new(),
            SagaState::Compensating,
            2,
            (),
            Vec::new(),
            steps(&["a", "b"]),
        );
        assert_eq!(saga.state(), SagaState::Compensating);
    }

    #[test]
    fn rehydrate_preserves_error_log() {
        let saga = SagaInstance::rehydrate(
            SagaId::new(),
            SagaState::Failed,
            1,
            (),
            vec!["boom".to_string()],
            steps(&["a", "b"]),
        );
        assert_eq!(saga.state(), SagaState::Failed);
        assert_eq!(saga.error_log(), &["boom"]);
    }
}
