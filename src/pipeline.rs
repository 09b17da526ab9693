//! Multi-stage rewriting: every stage is a rule rewritten under its policy, the stages are composed
//! in order and the result is compiled into one bimachine. Progress is reported to an optional
//! observer instead of being printed.

use color_eyre::eyre::Result;
use std::collections::HashSet;

use crate::bimachine::Bimachine;
use crate::builder::from_symbol_set;
use crate::fa::FA;
use crate::fst::Fst;
use crate::rewriter::RewritePolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent<'a> {
    StageStarted { name: &'a str },
    StageFinished { name: &'a str, num_states: usize },
    Composed { num_states: usize },
    BimachineBuilt { left_states: usize, right_states: usize },
}

/// Receives the progress of a pipeline build.
pub trait BuildObserver {
    fn notify(&self, event: &BuildEvent);
}

/// Forwards every build event to the `log` facade at info level.
pub struct LogObserver;

impl BuildObserver for LogObserver {
    fn notify(&self, event: &BuildEvent) {
        match event {
            BuildEvent::StageStarted { name } => {
                log::info!("Constructing the \"{}\" transducer", name)
            }
            BuildEvent::StageFinished { name, num_states } => {
                log::info!("The \"{}\" transducer has {} states", name, num_states)
            }
            BuildEvent::Composed { num_states } => {
                log::info!("The composed transducer has {} states", num_states)
            }
            BuildEvent::BimachineBuilt {
                left_states,
                right_states,
            } => log::info!(
                "Bimachine built with {} left and {} right states",
                left_states,
                right_states
            ),
        }
    }
}

struct Stage {
    name: String,
    rule: Fst,
    policy: RewritePolicy,
}

pub struct Pipeline<'a> {
    alphabet: HashSet<char>,
    stages: Vec<Stage>,
    observer: Option<&'a dyn BuildObserver>,
}

impl<'a> Pipeline<'a> {
    pub fn new(alphabet: HashSet<char>) -> Self {
        Pipeline {
            alphabet,
            stages: Vec::new(),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: &'a dyn BuildObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Append a stage rewriting with the leftmost-longest policy.
    pub fn add_stage(self, name: &str, rule: Fst) -> Self {
        self.add_stage_with_policy(name, rule, RewritePolicy::LeftmostLongest)
    }

    pub fn add_stage_with_policy(mut self, name: &str, rule: Fst, policy: RewritePolicy) -> Self {
        self.stages.push(Stage {
            name: name.to_string(),
            rule,
            policy,
        });
        self
    }

    pub fn get_alphabet(&self) -> &HashSet<char> {
        &self.alphabet
    }

    pub fn get_num_stages(&self) -> usize {
        self.stages.len()
    }

    fn notify(&self, event: BuildEvent) {
        if let Some(observer) = self.observer {
            observer.notify(&event);
        }
    }

    /// The composition of every rewritten stage. Without stages this is the identity over the
    /// alphabet.
    pub fn compile_transducer(&self) -> Fst {
        let mut rewriters = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            self.notify(BuildEvent::StageStarted { name: &stage.name });
            let rewriter = stage
                .rule
                .to_rewriter_with_policy(&self.alphabet, stage.policy);
            self.notify(BuildEvent::StageFinished {
                name: &stage.name,
                num_states: rewriter.get_num_states(),
            });
            rewriters.push(rewriter);
        }

        let composed = match rewriters.split_first() {
            Some((first, rest)) => {
                let rest: Vec<&Fst> = rest.iter().collect();
                first.compose_all(&rest)
            }
            None => from_symbol_set(self.alphabet.iter().copied())
                .star()
                .identity(),
        };

        self.notify(BuildEvent::Composed {
            num_states: composed.get_num_states(),
        });
        composed
    }

    pub fn compile(&self) -> Result<Bimachine> {
        let bimachine = self.compile_transducer().to_bimachine(&self.alphabet)?;

        self.notify(BuildEvent::BimachineBuilt {
            left_states: bimachine.get_left().get_num_states(),
            right_states: bimachine.get_right().get_num_states(),
        });
        Ok(bimachine)
    }
}
