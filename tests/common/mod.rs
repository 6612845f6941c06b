//! Scripted provisioner shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use infratest::flow::{Flow, Scheduler, SchedulerOptions};
use infratest::inventory::ActualResource;
use infratest::terraform::Provisioner;
use infratest::value::OutputSnapshot;
use infratest::{Error, Result};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// How the fake reacts to a command
#[derive(Clone)]
pub enum Behavior {
    Fail(String),
    /// Wait until cancelled
    Block,
    /// Sleep, ignoring cancellation
    Hang(Duration),
    Panic,
}

/// Records every command and answers according to a script
#[derive(Default)]
pub struct FakeProvisioner {
    pub log: Mutex<Vec<String>>,
    pub behaviors: HashMap<String, Behavior>,
    pub state: Vec<ActualResource>,
    pub outputs: OutputSnapshot,
    /// Per-call answers for `get_outputs`, by 1-based call number;
    /// `None` fails the call
    pub scripted_outputs: HashMap<usize, Option<OutputSnapshot>>,
    /// Notified when a blocking command starts waiting
    pub blocked: Arc<Notify>,
    pub output_calls: Mutex<usize>,
    pub cancelled: Mutex<HashSet<String>>,
}

impl FakeProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, command: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(command.to_string(), behavior);
        self
    }

    pub fn with_state(mut self, state: Vec<ActualResource>) -> Self {
        self.state = state;
        self
    }

    pub fn with_outputs(mut self, outputs: OutputSnapshot) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn outputs_on_call(mut self, call: usize, outputs: OutputSnapshot) -> Self {
        self.scripted_outputs.insert(call, Some(outputs));
        self
    }

    pub fn fail_outputs_on_call(mut self, call: usize) -> Self {
        self.scripted_outputs.insert(call, None);
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn run_command(&self, command: &str, cancel: &CancellationToken) -> Result<String> {
        self.log.lock().unwrap().push(command.to_string());
        match self.behaviors.get(command).cloned() {
            None => Ok(format!("ran {}", command)),
            Some(Behavior::Fail(output)) => Err(Error::CommandFailed {
                command: format!("terraform {}", command),
                exit_code: 1,
                output,
            }),
            Some(Behavior::Block) => {
                self.blocked.notify_one();
                cancel.cancelled().await;
                self.cancelled.lock().unwrap().insert(command.to_string());
                Err(Error::Cancelled)
            }
            Some(Behavior::Hang(d)) => {
                tokio::time::sleep(d).await;
                Ok(String::new())
            }
            Some(Behavior::Panic) => panic!("provisioner exploded on {}", command),
        }
    }

    async fn get_state(&self, _cancel: &CancellationToken) -> Result<Vec<ActualResource>> {
        Ok(self.state.clone())
    }

    async fn get_outputs(&self, _cancel: &CancellationToken) -> Result<OutputSnapshot> {
        let call = {
            let mut calls = self.output_calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        match self.scripted_outputs.get(&call) {
            Some(Some(outputs)) => Ok(outputs.clone()),
            Some(None) => Err(Error::ToolOutput {
                what: "outputs",
                message: "Error acquiring the state lock".into(),
            }),
            None => Ok(self.outputs.clone()),
        }
    }
}

pub fn flow(yaml: &str) -> Arc<Flow> {
    Arc::new(Flow::from_yaml(yaml, Path::new("/tmp/infratest")).unwrap())
}

pub fn scheduler(yaml: &str, fake: Arc<FakeProvisioner>) -> Scheduler {
    let options = SchedulerOptions {
        default_delay: Duration::from_millis(10),
        http_request_timeout: Duration::from_secs(2),
        ..SchedulerOptions::default()
    };
    Scheduler::new(flow(yaml), fake, options).unwrap()
}

pub fn resource(resource_type: &str, name: &str, id: &str) -> ActualResource {
    ActualResource {
        resource_type: resource_type.into(),
        name: name.into(),
        id: id.into(),
        address: format!("{}.{}", resource_type, name),
        attributes: Default::default(),
    }
}

pub fn names(scheduler: &Scheduler) -> Vec<(String, bool)> {
    scheduler
        .results()
        .iter()
        .map(|r| (r.step_name.clone(), r.success))
        .collect()
}
