//! Fixture host filesystem for integration tests.
//!
//! Builds a fake procfs tree, linker preload files, a kernel module status
//! file and a listing script under one temp dir, plus a TOML config that
//! points the scanner at all of them.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Boot time written to the fake `/proc/stat`.
pub const BOOT_TIME: i64 = 1_600_000_000;

pub const LISTING_HEADER: &str = "  PID  PPID   UID STAT                  STARTED COMMAND";

#[derive(Debug)]
pub struct FakeHost {
    dir: TempDir,
    listing_lines: Vec<String>,
}

impl FakeHost {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = Self {
            dir,
            listing_lines: Vec::new(),
        };
        fs::create_dir_all(host.proc_root()).expect("proc dir");
        fs::create_dir_all(host.conf_dir()).expect("conf dir");
        fs::write(
            host.proc_root().join("stat"),
            format!("cpu  1 2 3 4\nctxt 99\nbtime {BOOT_TIME}\nprocesses 12\n"),
        )
        .expect("proc stat");
        host
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn proc_root(&self) -> PathBuf {
        self.root().join("proc")
    }

    pub fn preload_file(&self) -> PathBuf {
        self.root().join("etc/ld.so.preload")
    }

    pub fn conf_dir(&self) -> PathBuf {
        self.root().join("etc/ld.so.conf.d")
    }

    pub fn kernel_status(&self) -> PathBuf {
        self.proc_root().join("rsc_lkm")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root().join("rkscan.toml")
    }

    /// Add a process that started at boot (old enough for any filter).
    pub fn add_process(&self, pid: u32, name: &str, cmdline: &str) {
        self.add_process_started(pid, name, cmdline, 0);
    }

    /// Add a process with an explicit start tick count.
    pub fn add_process_started(&self, pid: u32, name: &str, cmdline: &str, start_ticks: u64) {
        let dir = self.proc_root().join(pid.to_string());
        fs::create_dir_all(&dir).expect("pid dir");
        let mut stat = format!("{pid} ({name}) S 1 {pid} {pid} 0 -1 4194560");
        for _ in 0..12 {
            stat.push_str(" 0");
        }
        stat.push_str(&format!(" {start_ticks} 12345678 321 18446744073709551615\n"));
        fs::write(dir.join("stat"), stat).expect("stat");
        fs::write(
            dir.join("status"),
            format!(
                "Name:\t{name}\nUmask:\t0022\nState:\tS (sleeping)\nTgid:\t{pid}\n\
                 PPid:\t1\nUid:\t1000\t1000\t1000\t1000\nGid:\t1000\t1000\t1000\t1000\n"
            ),
        )
        .expect("status");
        let argv: String = cmdline.split(' ').map(|a| format!("{a}\0")).collect();
        fs::write(dir.join("cmdline"), argv).expect("cmdline");
    }

    /// Make `pid` appear in the fake listing output.
    pub fn list_process(&mut self, pid: u32, name: &str) {
        self.listing_lines
            .push(format!("{pid:>5}     1  1000 S    Mon Jan  6 09:12:01 2025 {name}"));
    }

    pub fn write_preload(&self, content: &str) {
        fs::write(self.preload_file(), content).expect("preload file");
    }

    pub fn write_conf(&self, name: &str, content: &str) {
        fs::write(self.conf_dir().join(name), content).expect("conf file");
    }

    pub fn write_kernel_status(&self, content: &str) {
        fs::write(self.kernel_status(), content).expect("kernel status");
    }

    /// Shell snippet that prints the header and every listed process.
    pub fn listing_script(&self) -> String {
        let mut script = format!("printf '%s\\n' '{LISTING_HEADER}'");
        for line in &self.listing_lines {
            script.push_str(&format!(" '{line}'"));
        }
        script
    }

    /// TOML config pointing every check at this host.
    pub fn config_toml(&self) -> String {
        format!(
            "[scan]\nmin_age_secs = 60\nproc_root = {proc:?}\n\n\
             [listing]\ncommand = \"sh\"\nargs = [\"-c\", {script:?}]\ntimeout_ms = 5000\n\n\
             [kernel]\nstatus_path = {kernel:?}\n\n\
             [preload]\npreload_file = {preload:?}\nconf_dir = {conf:?}\n",
            proc = self.proc_root().display().to_string(),
            script = self.listing_script(),
            kernel = self.kernel_status().display().to_string(),
            preload = self.preload_file().display().to_string(),
            conf = self.conf_dir().display().to_string(),
        )
    }

    /// Write the config file and return its path.
    pub fn write_config(&self) -> PathBuf {
        let path = self.config_path();
        fs::write(&path, self.config_toml()).expect("config");
        path
    }
}
