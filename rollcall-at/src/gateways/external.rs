//! External index executables
//!
//! Each gateway operation spawns one short-lived process:
//!
//! | Operation              | Invocation                                  |
//! |------------------------|---------------------------------------------|
//! | ordered build          | `create_avl <artifact>` + stdin `value key` |
//! | ordered update         | `update_avl <artifact> <value> <key>`       |
//! | ordered threshold      | `threshold <artifact> <threshold> <dir>`    |
//! | prefix build           | `create_trie`                               |
//! | prefix insert          | `insert_trie <name> <key>`                  |
//! | prefix search          | `search_trie <query>`                       |
//! | gallery resolve        | `distance <128 components>`                 |
//!
//! Ordered artifacts live at `<artifact_dir>/<subject>.dat`. The trie and
//! distance executables use fixed paths relative to their working
//! directory: both read the student roster at [`ROSTER_FILE`] and the trie
//! tools keep their index at [`NAME_INDEX_FILE`]. Every process runs in the
//! configured work dir, and the gallery and prefix builds keep the roster
//! in step with the record store.
//!
//! Threshold and trie searches print a lone `0` when nothing matches. A
//! single enrolled student with id 0 is therefore indistinguishable from an
//! empty result in this mode.

use async_trait::async_trait;
use rollcall_common::{Descriptor, Student, StudentId, Subject};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

use crate::gateways::{
    DescriptorGallery, Direction, GatewayError, OrderedIndexGateway, PrefixIndexGateway, Resolution,
};

pub const CREATE_AVL: &str = "create_avl";
pub const UPDATE_AVL: &str = "update_avl";
pub const THRESHOLD: &str = "threshold";
pub const CREATE_TRIE: &str = "create_trie";
pub const INSERT_TRIE: &str = "insert_trie";
pub const SEARCH_TRIE: &str = "search_trie";
pub const DISTANCE: &str = "distance";

/// Student roster read by `create_trie` and `distance`, relative to the work dir
pub const ROSTER_FILE: &str = "executable/data/students.csv";
/// Serialized name trie maintained by the trie tools, relative to the work dir
pub const NAME_INDEX_FILE: &str = "executable/serialized/name.dat";

const ROSTER_HEADER: &str = "student_id,name,rn,facial_vector";

/// Locations of the executables and the artifacts they maintain
#[derive(Debug)]
pub struct ExternalTools {
    bin_dir: PathBuf,
    artifact_dir: PathBuf,
    work_dir: PathBuf,
    /// Serializes roster rewrites
    roster: Mutex<()>,
}

impl ExternalTools {
    /// Relative `bin_dir` and `artifact_dir` are taken from `work_dir`
    pub fn new(bin_dir: PathBuf, artifact_dir: PathBuf, work_dir: PathBuf) -> Self {
        Self {
            bin_dir: work_dir.join(bin_dir),
            artifact_dir: work_dir.join(artifact_dir),
            work_dir,
            roster: Mutex::new(()),
        }
    }

    pub fn artifact_path(&self, subject: Subject) -> PathBuf {
        self.artifact_dir.join(format!("{}.dat", subject))
    }

    pub fn roster_path(&self) -> PathBuf {
        self.work_dir.join(ROSTER_FILE)
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    async fn ensure_layout(&self) -> Result<(), GatewayError> {
        let mut dirs = vec![self.artifact_dir.clone()];
        for file in [ROSTER_FILE, NAME_INDEX_FILE] {
            if let Some(parent) = Path::new(file).parent() {
                dirs.push(self.work_dir.join(parent));
            }
        }
        for dir in dirs {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| io_failure("creating", &dir, e))?;
        }
        Ok(())
    }

    /// Run one executable to completion and return its stdout
    pub async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<String>,
    ) -> Result<String, GatewayError> {
        self.ensure_layout().await?;
        let path = self.bin_dir.join(program);
        debug!(program, args = args.len(), "Invoking index executable");

        let mut child = Command::new(&path)
            .args(args)
            .current_dir(&self.work_dir)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GatewayError::Launch {
                program: program.to_string(),
                message: e.to_string(),
            })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .await
                .map_err(|e| GatewayError::Launch {
                    program: program.to_string(),
                    message: format!("writing stdin: {}", e),
                })?;
            // Dropping the pipe closes stdin so the tool sees EOF
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| GatewayError::Launch {
                program: program.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(GatewayError::Process {
                program: program.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Replace the roster with exactly `students`
    pub async fn write_roster(&self, students: &[Student]) -> Result<(), GatewayError> {
        let mut contents = format!("{}\n", ROSTER_HEADER);
        for student in students {
            contents.push_str(&roster_row(student)?);
        }

        let _lock = self.roster.lock().await;
        self.ensure_layout().await?;
        self.replace_roster(&contents).await?;
        debug!(students = students.len(), "Student roster rewritten");
        Ok(())
    }

    /// Add one student's row, leaving an identical existing row alone
    pub async fn append_roster(&self, student: &Student) -> Result<(), GatewayError> {
        let row = roster_row(student)?;

        let _lock = self.roster.lock().await;
        self.ensure_layout().await?;
        let path = self.roster_path();
        let mut contents = match tokio::fs::read_to_string(&path).await {
            Ok(existing) => existing,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => format!("{}\n", ROSTER_HEADER),
            Err(e) => return Err(io_failure("reading", &path, e)),
        };

        let key = format!("{},", student.id);
        if let Some(existing) = contents.lines().skip(1).find(|line| line.starts_with(&key)) {
            if existing == row.trim_end() {
                return Ok(());
            }
            return Err(GatewayError::Rejected(format!(
                "roster already holds a different row for student {}",
                student.id
            )));
        }

        if !contents.ends_with('\n') {
            contents.push('\n');
        }
        contents.push_str(&row);
        self.replace_roster(&contents).await
    }

    async fn replace_roster(&self, contents: &str) -> Result<(), GatewayError> {
        let path = self.roster_path();
        let staging = path.with_extension("csv.tmp");
        tokio::fs::write(&staging, contents)
            .await
            .map_err(|e| io_failure("writing", &staging, e))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| io_failure("replacing", &path, e))
    }
}

fn io_failure(action: &str, path: &Path, e: std::io::Error) -> GatewayError {
    GatewayError::Rejected(format!("{} {}: {}", action, path.display(), e))
}

/// One roster line: `student_id,name,rn,"descriptor"`
///
/// The tools split on bare commas, so names and roll numbers must not
/// contain commas, quotes or line breaks.
pub fn roster_row(student: &Student) -> Result<String, GatewayError> {
    for (field, value) in [("name", &student.name), ("roll number", &student.roll_number)] {
        if value.contains([',', '"', '\n', '\r']) {
            return Err(GatewayError::Rejected(format!(
                "{} {:?} cannot be written to the student roster",
                field, value
            )));
        }
    }
    Ok(format!(
        "{},{},{},\"{}\"\n",
        student.id,
        student.name,
        student.roll_number,
        student.descriptor.to_delimited()
    ))
}

/// Parse whitespace-separated keys; empty output means no matches
pub fn parse_keys(program: &str, output: &str) -> Result<Vec<StudentId>, GatewayError> {
    output
        .split_whitespace()
        .map(|token| {
            token.parse::<StudentId>().map_err(|_| GatewayError::Output {
                program: program.to_string(),
                output: output.to_string(),
            })
        })
        .collect()
}

/// Parse a search listing where a lone `0` means "nothing matched"
pub fn parse_listing(program: &str, output: &str) -> Result<Vec<StudentId>, GatewayError> {
    if output.trim() == "0" {
        return Ok(Vec::new());
    }
    parse_keys(program, output)
}

/// Parse the single integer printed by the distance tool
pub fn parse_resolution(output: &str) -> Result<Resolution, GatewayError> {
    let invalid = || GatewayError::Output {
        program: DISTANCE.to_string(),
        output: output.to_string(),
    };
    let raw: i64 = output.trim().parse().map_err(|_| invalid())?;
    if raw == -1 {
        return Ok(Resolution::NoMatch);
    }
    StudentId::new(raw)
        .map(Resolution::Match)
        .map_err(|_| invalid())
}

/// Ordered index backed by `create_avl` / `update_avl` / `threshold`
pub struct ExternalOrderedIndex {
    tools: Arc<ExternalTools>,
}

impl ExternalOrderedIndex {
    pub fn new(tools: Arc<ExternalTools>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl OrderedIndexGateway for ExternalOrderedIndex {
    async fn build(&self, subject: Subject, entries: &[(StudentId, u32)]) -> Result<(), GatewayError> {
        let input: String = entries
            .iter()
            .map(|(id, value)| format!("{} {}\n", value, id))
            .collect();
        let artifact = self.tools.artifact_path(subject);
        self.tools
            .run(CREATE_AVL, &[artifact.display().to_string()], Some(input))
            .await?;
        Ok(())
    }

    async fn update(&self, subject: Subject, id: StudentId, value: u32) -> Result<(), GatewayError> {
        let args = [
            self.tools.artifact_path(subject).display().to_string(),
            value.to_string(),
            id.to_string(),
        ];
        self.tools.run(UPDATE_AVL, &args, None).await?;
        Ok(())
    }

    async fn threshold_query(
        &self,
        subject: Subject,
        threshold: i64,
        direction: Direction,
    ) -> Result<Vec<StudentId>, GatewayError> {
        let args = [
            self.tools.artifact_path(subject).display().to_string(),
            threshold.to_string(),
            direction.as_arg().to_string(),
        ];
        let output = self.tools.run(THRESHOLD, &args, None).await?;
        parse_listing(THRESHOLD, &output)
    }
}

/// Prefix index backed by `create_trie` / `insert_trie` / `search_trie`
pub struct ExternalPrefixIndex {
    tools: Arc<ExternalTools>,
}

impl ExternalPrefixIndex {
    pub fn new(tools: Arc<ExternalTools>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl PrefixIndexGateway for ExternalPrefixIndex {
    async fn build(&self, students: &[Student]) -> Result<(), GatewayError> {
        // create_trie reads names from the roster
        self.tools.write_roster(students).await?;
        self.tools.run(CREATE_TRIE, &[], None).await?;
        Ok(())
    }

    async fn insert(&self, name: &str, id: StudentId) -> Result<(), GatewayError> {
        self.tools
            .run(INSERT_TRIE, &[name.to_string(), id.to_string()], None)
            .await?;
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Vec<StudentId>, GatewayError> {
        let output = self.tools.run(SEARCH_TRIE, &[query.to_string()], None).await?;
        parse_listing(SEARCH_TRIE, &output)
    }
}

/// Gallery backed by the `distance` executable and the roster it reads
pub struct ExternalGallery {
    tools: Arc<ExternalTools>,
}

impl ExternalGallery {
    pub fn new(tools: Arc<ExternalTools>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl DescriptorGallery for ExternalGallery {
    async fn build(&self, students: &[Student]) -> Result<(), GatewayError> {
        self.tools.write_roster(students).await
    }

    async fn insert(&self, student: &Student) -> Result<(), GatewayError> {
        self.tools.append_roster(student).await
    }

    async fn resolve(&self, probe: &Descriptor) -> Result<Resolution, GatewayError> {
        let args: Vec<String> = probe.components().iter().map(|c| c.to_string()).collect();
        let output = self.tools.run(DISTANCE, &args, None).await?;
        parse_resolution(&output)
    }
}
