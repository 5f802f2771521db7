use std::{
    process::Child,
    time::{Duration, Instant},
};

use anyhow::{self, bail, Context};
use cgroups_rs::{Cgroup, CgroupPid};
use tracing::warn;

use super::{create_process, Limits};

/// Real user id, as listed in `/proc/self/status`.
fn current_uid() -> anyhow::Result<u32> {
    let status =
        std::fs::read_to_string("/proc/self/status").context("could not read process status")?;
    parse_uid(&status).context("no Uid entry in process status")
}

fn parse_uid(status: &str) -> Option<u32> {
    let line = status.lines().find(|line| line.starts_with("Uid:"))?;
    line.split_whitespace().nth(1)?.parse().ok()
}

/// Groups live under the user's systemd service, the only delegated subtree for an
/// unprivileged user.
fn user_group_path(uid: u32, group_name: &str) -> String {
    format!("user.slice/user-{uid}.slice/user@{uid}.service/{group_name}")
}

/// Create a cgroup at `path` with the provided limitations.
///
/// # Errors
///
/// This function will return an error if the cgroup could not be created. This can happen if the
/// limits are incorrect or if cgroup v2 is not available.
pub fn create_cgroup(path: &str, limits: &Limits) -> anyhow::Result<Cgroup> {
    let mut builder = cgroups_rs::cgroup_builder::CgroupBuilder::new(path);
    if limits.max_memory > 0 {
        builder = builder.memory().memory_hard_limit(limits.max_memory).done();
    }
    if limits.max_pids > 0 {
        builder = builder
            .pid()
            .maximum_number_of_processes(cgroups_rs::MaxValue::Value(limits.max_pids))
            .done();
    }
    if !limits.cpus.is_empty() {
        builder = builder.cpu().cpus(limits.cpus.clone()).done();
    }
    builder
        .build(cgroups_rs::hierarchies::auto())
        .context("could not create cgroup")
}

/// Poll `group` until `pid` left it.
fn wait_until_gone(group: &Cgroup, pid: u64, max_duration: Duration) -> anyhow::Result<()> {
    let deadline = Instant::now() + max_duration;
    let poll = Duration::from_millis(10).min(max_duration / 10);
    while group.tasks().iter().any(|task| task.pid == pid) {
        if Instant::now() > deadline {
            bail!("process {pid} still in its cgroup after {max_duration:?}");
        }
        std::thread::sleep(poll);
    }
    Ok(())
}

fn spawn_in_group(command: &str, args: &[String], group: &Cgroup) -> anyhow::Result<Child> {
    let mut child = create_process(command, args)?;
    let pid = CgroupPid {
        pid: child.id() as u64,
    };
    if let Err(e) = group.add_task_by_tgid(pid) {
        if let Err(kill) = child.kill() {
            warn!("could not kill process {} left outside its cgroup: {kill}", child.id());
        }
        let _ = child.wait();
        return Err(e).context("could not add process to cgroup");
    }
    Ok(child)
}

/// A child process with piped standard streams, optionally confined to its own cgroup.
///
/// The child is killed on drop, and its cgroup removed.
#[derive(Debug)]
pub struct LimitedProcess {
    pub child: Child,
    cgroup: Option<Cgroup>,
    cleaned_up: bool,
}

impl LimitedProcess {
    /// Launch `command` inside a fresh cgroup named `group_name`.
    ///
    /// `group_name` must be unique among the live processes of this user.
    pub fn launch(
        command: &str,
        args: &[String],
        limits: &Limits,
        group_name: &str,
    ) -> anyhow::Result<LimitedProcess> {
        let uid = current_uid().context("could not get user id")?;
        let group = create_cgroup(&user_group_path(uid, group_name), limits)?;
        let child = match spawn_in_group(command, args, &group) {
            Ok(child) => child,
            Err(e) => {
                let _ = group.delete();
                return Err(e);
            }
        };

        Ok(LimitedProcess {
            child,
            cgroup: Some(group),
            cleaned_up: false,
        })
    }

    pub fn launch_without_container(command: &str, args: &[String]) -> anyhow::Result<LimitedProcess> {
        let child = create_process(command, args).context("could not create process")?;

        Ok(LimitedProcess {
            child,
            cgroup: None,
            cleaned_up: false,
        })
    }

    /// Kill the process (and everything in its cgroup), waiting at most `max_duration` for the
    /// cgroup to empty.
    pub fn try_kill(&mut self, max_duration: Duration) -> anyhow::Result<()> {
        match &mut self.cgroup {
            Some(group) => {
                group.kill().context("could not kill cgroup")?;
                wait_until_gone(group, self.child.id() as u64, max_duration)?;
                if let Err(e) = group.delete() {
                    warn!("could not remove cgroup, leftover groups slow the machine down: {e}");
                }
            }
            None => self.child.kill().context("could not kill process")?,
        }
        let _ = self.child.wait();
        self.cleaned_up = true;
        Ok(())
    }
}

impl Drop for LimitedProcess {
    fn drop(&mut self) {
        static CLEANUP_DURATION: Duration = Duration::from_millis(100);
        if !self.cleaned_up {
            if let Err(e) = self.try_kill(CLEANUP_DURATION) {
                warn!("could not kill process/cgroup {} on drop: {e:#}", self.child.id());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cgroup_path_is_under_user_service() {
        assert_eq!(
            user_group_path(1000, "GAME_RUNNER_1_referee"),
            "user.slice/user-1000.slice/user@1000.service/GAME_RUNNER_1_referee"
        );
    }

    #[test]
    fn uid_is_read_from_status() {
        let status = "Name:\tsh\nUmask:\t0022\nUid:\t1000\t1000\t1000\t1000\nGid:\t100\n";
        assert_eq!(parse_uid(status), Some(1000));
        assert_eq!(parse_uid("Name:\tsh\n"), None);
        assert!(current_uid().is_ok());
    }

    #[test]
    fn uncontained_process_is_killed() {
        let mut process =
            LimitedProcess::launch_without_container("sleep", &["10".to_string()]).unwrap();
        process.try_kill(Duration::from_secs(1)).unwrap();
        assert!(process.child.try_wait().unwrap().is_some());
    }
}
