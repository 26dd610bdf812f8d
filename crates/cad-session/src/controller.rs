use std::fmt;

use cad_ai::{GenerationRequest, LanguageModel, extract_code, system_prompt};
use cad_script::{Sandbox, validate};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::config::Config;
use crate::error::{OperationError, PersistenceError};
use crate::ledger::{HistoryLedger, Turn, TurnId, TurnStatus};
use crate::store::ArtifactStore;

/// Stage of a user operation. `Committed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Generating,
    Validating,
    Executing,
    Persisting,
    Committed,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Generating => "generating",
            Phase::Validating => "validating",
            Phase::Executing => "executing",
            Phase::Persisting => "persisting",
            Phase::Committed => "committed",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// History plus the turn currently shown; one per user session.
#[derive(Debug)]
pub struct Session {
    ledger: HistoryLedger,
    head: Option<TurnId>,
}

impl Session {
    pub fn new(ledger: HistoryLedger) -> Self {
        Self { ledger, head: None }
    }

    pub fn open(config: &Config) -> Result<Self, PersistenceError> {
        HistoryLedger::open(config.history_path()).map(Self::new)
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    pub fn history(&self) -> &[Turn] {
        self.ledger.turns()
    }

    pub fn head(&self) -> Option<TurnId> {
        self.head
    }

    /// The turn `head` points at, if it is still in history.
    pub fn head_turn(&self) -> Option<&Turn> {
        self.head.and_then(|id| self.ledger.get(&id))
    }

    /// Re-reads the ledger file and drops `head` if its turn was cleared elsewhere.
    pub fn refresh(&mut self) -> Result<(), PersistenceError> {
        let result = self.ledger.refresh().map(|_| ());
        self.reconcile_head();
        result
    }

    fn reconcile_head(&mut self) {
        if let Some(id) = self.head
            && self.ledger.get(&id).is_none()
        {
            warn!(turn = %id, "head turn left history, resetting head");
            self.head = None;
        }
    }

    /// Parses a full turn id or a unique prefix of one.
    pub fn resolve(&self, text: &str) -> Result<TurnId, OperationError> {
        self.ledger
            .resolve(text)
            .ok_or_else(|| OperationError::UnknownTurn(text.trim().to_string()))
    }
}

/// Artifact bytes handed to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

enum Source {
    Generate { prior_code: Option<String> },
    Local(String),
}

/// Drives prompts through generate, validate, execute, persist and commit.
pub struct RefinementController<M> {
    model: M,
    store: ArtifactStore,
    sandbox: Sandbox,
    system_prompt: String,
    trace: Vec<Phase>,
}

impl<M: LanguageModel> RefinementController<M> {
    pub fn new(model: M, store: ArtifactStore, sandbox: Sandbox) -> Self {
        Self {
            model,
            store,
            sandbox,
            system_prompt: system_prompt(),
            trace: Vec::new(),
        }
    }

    pub fn from_config(model: M, config: &Config) -> Result<Self, OperationError> {
        let store = ArtifactStore::open(
            config.models_dir(),
            config.mesh.format,
            config.mesh.meshing(),
        )?;
        Ok(Self::new(model, store, config.script.sandbox()))
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Phases visited by the most recent generate, refine or run.
    pub fn last_trace(&self) -> &[Phase] {
        &self.trace
    }

    /// Fresh generation from a prompt, with no parent.
    pub fn generate(&mut self, session: &mut Session, prompt: &str) -> Result<Turn, OperationError> {
        let _span = info_span!("generate").entered();
        self.begin();
        self.run(session, prompt, None, Source::Generate { prior_code: None })
    }

    /// Asks the model to modify `base`'s code; the new turn's parent is `base`.
    pub fn refine(
        &mut self,
        session: &mut Session,
        change: &str,
        base: TurnId,
    ) -> Result<Turn, OperationError> {
        let _span = info_span!("refine", base = %base).entered();
        self.begin();
        if let Err(err) = session.refresh() {
            self.enter(Phase::Failed);
            return Err(err.into());
        }
        let Some(base_turn) = session.ledger.get(&base) else {
            self.enter(Phase::Failed);
            warn!(base = %base, "refinement base is not in history");
            return Err(OperationError::UnknownTurn(base.to_string()));
        };
        let prior_code = Some(base_turn.code.clone());
        self.run(session, change, Some(base), Source::Generate { prior_code })
    }

    /// Commits locally written script code without calling the model.
    pub fn run_code(
        &mut self,
        session: &mut Session,
        prompt: &str,
        code: &str,
        parent: Option<TurnId>,
    ) -> Result<Turn, OperationError> {
        let _span = info_span!("run_code").entered();
        self.begin();
        if let Err(err) = session.refresh() {
            self.enter(Phase::Failed);
            return Err(err.into());
        }
        if let Some(parent) = parent
            && session.ledger.get(&parent).is_none()
        {
            self.enter(Phase::Failed);
            return Err(OperationError::UnknownTurn(parent.to_string()));
        }
        self.run(session, prompt, parent, Source::Local(code.to_string()))
    }

    /// Points `head` at an existing turn. Nothing is executed or appended.
    pub fn load<'s>(&self, session: &'s mut Session, id: TurnId) -> Result<&'s Turn, OperationError> {
        if session.ledger.get(&id).is_none() {
            return Err(OperationError::UnknownTurn(id.to_string()));
        }
        session.head = Some(id);
        info!(turn = %id, "head moved");
        session
            .ledger
            .get(&id)
            .ok_or_else(|| OperationError::UnknownTurn(id.to_string()))
    }

    /// Removes every turn and artifact and resets `head`.
    pub fn clear_history(&mut self, session: &mut Session) -> Result<usize, OperationError> {
        let cleared = session.ledger.clear(&self.store)?;
        session.head = None;
        Ok(cleared)
    }

    pub fn download(&self, session: &Session, id: TurnId) -> Result<Download, OperationError> {
        let turn = session
            .ledger
            .get(&id)
            .ok_or_else(|| OperationError::UnknownTurn(id.to_string()))?;
        let bytes = self.store.read(&turn.artifact.file_name)?;
        Ok(Download {
            file_name: turn.artifact.file_name.clone(),
            bytes,
        })
    }

    fn run(
        &mut self,
        session: &mut Session,
        prompt: &str,
        parent: Option<TurnId>,
        source: Source,
    ) -> Result<Turn, OperationError> {
        let outcome = self.pipeline(session, prompt, parent, source);
        match &outcome {
            Ok(turn) => {
                self.enter(Phase::Committed);
                info!(turn = %turn.id, file = %turn.artifact.file_name, "operation committed");
            }
            Err(err) => {
                self.enter(Phase::Failed);
                warn!(kind = %err.kind(), error = %err, "operation failed");
            }
        }
        outcome
    }

    fn pipeline(
        &mut self,
        session: &mut Session,
        prompt: &str,
        parent: Option<TurnId>,
        source: Source,
    ) -> Result<Turn, OperationError> {
        let code = match source {
            Source::Generate { prior_code } => {
                self.enter(Phase::Generating);
                let request = match prior_code.as_deref() {
                    Some(code) => GenerationRequest::refinement(&self.system_prompt, prompt, code),
                    None => GenerationRequest::fresh(&self.system_prompt, prompt),
                };
                let reply = self.model.generate(&request)?;
                extract_code(&reply)?
            }
            Source::Local(code) => code.trim().to_string(),
        };

        self.enter(Phase::Validating);
        let program = validate(&code)?;

        self.enter(Phase::Executing);
        let artifact = self.sandbox.execute(&program)?;
        debug!(binding = %artifact.binding, nodes = artifact.solid.node_count(), "artifact selected");

        self.enter(Phase::Persisting);
        let id = TurnId::new();
        let stored = self.store.persist(&artifact, prompt, &id)?;

        let turn = Turn {
            id,
            prompt: prompt.to_string(),
            code,
            artifact: stored.to_ref(),
            parent_id: parent,
            created_at: Utc::now(),
            status: TurnStatus::Committed,
        };
        match session.ledger.append(turn) {
            Ok(turn) => {
                let turn = turn.clone();
                session.head = Some(turn.id);
                Ok(turn)
            }
            Err(err) => {
                session.reconcile_head();
                if let Err(remove_err) = self.store.remove(&stored.file_name) {
                    warn!(
                        file = %stored.file_name,
                        error = %remove_err,
                        "failed to remove artifact after rejected commit"
                    );
                }
                Err(err.into())
            }
        }
    }

    fn begin(&mut self) {
        self.trace.clear();
        self.trace.push(Phase::Idle);
    }

    fn enter(&mut self, phase: Phase) {
        if let Some(from) = self.trace.last() {
            debug!(from = %from, to = %phase, "phase transition");
        }
        self.trace.push(phase);
    }
}
