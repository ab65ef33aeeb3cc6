//! Scripted demo scenario
//!
//! Two savings accounts, one funds account and four transfer actors, driven on
//! a fixed timeline: balance checks, then transfers, then a funds deposit and
//! maturity, then shutdown.

use std::time::Duration;

use tokio::{task::JoinHandle, time::Instant};
use tracing::{Level, event};

use crate::{
    actor::{EventLevel, Ledger},
    domain::{
        account::{ActorKind, Amount, InitParams},
        constant::driver,
        error::LedgerError,
        message::Command
    }
};

/// One scheduled action
#[derive(Debug, Clone)]
pub enum Step {
    Create { kind: ActorKind, actor_id: String, params: InitParams },
    Tell { target: String, command: Command },
    /// Record the balance of each id before anything is torn down
    Snapshot(Vec<String>),
    TerminateAll
}

/// Steps that fire together at `at` after the scenario starts
#[derive(Debug, Clone)]
pub struct Phase {
    pub at:    Duration,
    pub label: &'static str,
    pub steps: Vec<Step>
}

/// Outcome of a scenario run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DemoReport {
    /// Balance per snapshotted id; `None` when the actor was gone
    pub balances:   Vec<(String, Option<Amount>)>,
    pub terminated: usize
}

impl DemoReport {
    pub fn balance(&self, id: &str) -> Option<Amount> {
        self.balances.iter().find(|(known, _)| known == id).and_then(|(_, balance)| *balance)
    }
}

fn create(kind: ActorKind, actor_id: &str, params: InitParams) -> Step {
    Step::Create { kind, actor_id: actor_id.to_string(), params }
}

fn tell(target: &str, command: Command) -> Step {
    Step::Tell { target: target.to_string(), command }
}

fn transfer(amount: Amount) -> Command {
    Command::Transfer { amount, from: None, to: None }
}

/// The demo timeline.
pub fn scripted() -> Vec<Phase> {
    vec![
        Phase {
            at:    Duration::ZERO,
            label: "Setup",
            steps: vec![
                create(ActorKind::Savings, "AccountA", InitParams::account("A", 100.0)),
                create(ActorKind::Savings, "AccountB", InitParams::account("B", 50.0)),
                create(ActorKind::Transfer, "ActionActor", InitParams::transfer("A", "B")),
                create(ActorKind::Transfer, "ActionActor2", InitParams::transfer("A", "C")),
                create(ActorKind::Funds, "fundA", InitParams::account("fA", 100.0)),
                create(ActorKind::Transfer, "fA_Transfer_A", InitParams::transfer("fA", "A")),
                create(ActorKind::Transfer, "A_Transfer_fA", InitParams::transfer("A", "fA"))
            ]
        },
        Phase {
            at:    Duration::from_millis(500),
            label: "Balances",
            steps: vec![
                tell("AccountA", Command::GetBalance),
                tell("AccountB", Command::GetBalance),
                tell("AccountA", Command::Deposit { amount: 50.0 }),
                tell("AccountB", Command::Withdraw { amount: 30.0 }),
                tell("fundA", Command::GetBalance)
            ]
        },
        Phase {
            at:    Duration::from_millis(800),
            label: "Transfers",
            steps: vec![
                tell("ActionActor", transfer(10.0)),
                tell("ActionActor2", transfer(10.0)),
                tell("fA_Transfer_A", transfer(10.0)),
                tell("A_Transfer_fA", transfer(10.0))
            ]
        },
        Phase {
            at:    Duration::from_millis(1000),
            label: "Funds",
            steps: vec![
                tell("fundA", Command::Deposit { amount: 50.0 }),
                tell("fundA", Command::Mature { target_id: Some("A".to_string()) })
            ]
        },
        Phase {
            at:    Duration::from_millis(2000),
            label: "Shutdown",
            steps: vec![
                Step::Snapshot(["A", "B", "C", "fA"].iter().map(|id| id.to_string()).collect()),
                Step::TerminateAll
            ]
        }
    ]
}

/// Execute `phases` against `ledger`, each at its offset from now.
pub async fn run(ledger: &Ledger, phases: &[Phase]) -> Result<DemoReport, LedgerError> {
    let start = Instant::now();
    let mut report = DemoReport::default();

    for phase in phases {
        tokio::time::sleep_until(start + phase.at).await;
        event!(Level::INFO, event = driver::DEMO_PHASE, phase = %phase.label, at_ms = %phase.at.as_millis());

        for step in &phase.steps {
            match step.clone() {
                Step::Create { kind, actor_id, params } => {
                    ledger.create_and_register(kind, actor_id, params).await?;
                }
                Step::Tell { target, command } => ledger.tell(&target, command).await?,
                Step::Snapshot(ids) => {
                    for id in ids {
                        let balance = match ledger.request(&id, Command::GetBalance).await {
                            Ok(reply) => reply.balance(),
                            Err(LedgerError::ActorNotFound(_)) => None,
                            Err(e) => return Err(e)
                        };
                        report.balances.push((id, balance));
                    }
                }
                Step::TerminateAll => report.terminated += ledger.terminate_all().await?
            }
        }
    }

    Ok(report)
}

/// Print notifications as `[actor]: message` until the stream closes.
pub fn print_notifications(ledger: &Ledger, verbose: bool) -> JoinHandle<()> {
    let mut events = ledger.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(notification) => match notification.level {
                    EventLevel::Debug if !verbose => {}
                    EventLevel::Error | EventLevel::Warn => {
                        eprintln!("[{}]: {}", notification.actor_id, notification.message)
                    }
                    _ => println!("[{}]: {}", notification.actor_id, notification.message)
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    eprintln!("... {} notifications dropped", skipped)
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;

    fn approx(left: Option<Amount>, right: Amount) -> bool {
        left.is_some_and(|left| (left - right).abs() < 1e-9)
    }

    #[tokio::test]
    async fn test_scripted_scenario_final_balances() {
        let ledger = Ledger::start(RuntimeConfig::default()).await.unwrap();

        let report = run(&ledger, &scripted()).await.unwrap();

        // A: 100 + 50 - 10 (to B) - 10 (to C) - 10 (to fA) + matured fA
        // fA: 100 -> 110, +10 -> 132, +50 -> 200.2, then matured into A
        assert!(approx(report.balance("A"), 120.0 + 200.2), "A was {:?}", report.balance("A"));
        assert!(approx(report.balance("B"), 30.0));
        assert!(approx(report.balance("C"), 10.0));
        assert_eq!(report.balance("fA"), None);
        // AccountA, AccountB, C and the four transfer actors
        assert_eq!(report.terminated, 7);
        assert!(ledger.lookup("A").await.unwrap().is_none());
        ledger.shutdown();
    }

    #[tokio::test]
    async fn test_unknown_target_aborts_run() {
        let ledger = Ledger::start(RuntimeConfig::default()).await.unwrap();
        let phases = vec![Phase { at: Duration::ZERO, label: "Broken", steps: vec![tell("ghost", Command::GetBalance)] }];

        let result = run(&ledger, &phases).await;

        assert_eq!(result, Err(LedgerError::ActorNotFound("ghost".to_string())));
        ledger.shutdown();
    }

    #[test]
    fn test_timeline_is_ordered() {
        let phases = scripted();

        assert!(phases.windows(2).all(|pair| pair[0].at < pair[1].at));
        assert!(matches!(phases.last().and_then(|phase| phase.steps.last()), Some(Step::TerminateAll)));
    }
}
