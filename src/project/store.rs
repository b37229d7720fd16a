//! Project persistence.
//!
//! [`ProjectStore`] is the only way the rest of the crate reads or writes
//! durable state: the project itself, the history log and the session cookie
//! jar. [`FileProjectStore`] keeps them in files next to each other;
//! [`MemoryProjectStore`] keeps them in memory for tests and dry runs.

use super::{Project, ProjectError, DEFAULT_PROJECT_NAME};
use crate::config::{resolve_path, ProjectSettings};
use crate::history::{self, HistoryConfig, HistoryEntry};
use crate::session::Session;
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Default project file location, relative to the working directory.
pub const DEFAULT_PROJECT_FILE: &str = ".reqflow/project.json";

/// Durable storage for one project.
pub trait ProjectStore {
    /// Loads the project.
    fn load(&mut self) -> Result<Project, ProjectError>;

    /// Saves the project, replacing what was stored.
    fn save(&mut self, project: &Project) -> Result<(), ProjectError>;

    /// Appends one entry to the project history.
    fn append_history(&mut self, entry: &HistoryEntry) -> Result<(), ProjectError>;

    /// Loads the project history, oldest first.
    fn load_history(&self) -> Result<Vec<HistoryEntry>, ProjectError>;

    /// Removes every history entry.
    fn clear_history(&mut self) -> Result<(), ProjectError>;

    /// Loads the session cookie jar, dropping cookies past their lifetime.
    fn load_session(&self) -> Result<Session, ProjectError>;

    /// Saves the session cookie jar.
    fn save_session(&mut self, session: &Session) -> Result<(), ProjectError>;
}

/// File-backed project store.
///
/// History and session paths come from the project settings and are resolved
/// relative to the project file's directory. The settings seen by the last
/// `load` or `save` are used.
#[derive(Debug, Clone)]
pub struct FileProjectStore {
    path: PathBuf,
    settings: ProjectSettings,
}

impl FileProjectStore {
    /// Creates a store for the project file at `path`. Nothing is read yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            settings: ProjectSettings::default(),
        }
    }

    /// Creates a new project file, refusing to overwrite an existing one.
    ///
    /// An empty or missing name becomes [`DEFAULT_PROJECT_NAME`].
    pub fn init(path: impl Into<PathBuf>, name: Option<&str>) -> Result<(Self, Project), ProjectError> {
        let mut store = Self::new(path);
        if store.path.exists() {
            return Err(ProjectError::AlreadyExists(store.path.clone()));
        }

        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_PROJECT_NAME);
        let project = Project::new(name);
        store.save(&project)?;
        log::info!("created project {:?} at {}", name, store.path.display());

        Ok((store, project))
    }

    /// Path of the project file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolved path of the history file.
    pub fn history_path(&self) -> PathBuf {
        resolve_path(&self.path, &self.settings.history_file)
    }

    /// Resolved path of the session file.
    pub fn session_path(&self) -> PathBuf {
        resolve_path(&self.path, &self.settings.session_file)
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ProjectError + '_ {
    move |source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn parse_error(path: &Path) -> impl FnOnce(serde_json::Error) -> ProjectError + '_ {
    move |source| ProjectError::Parse {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes `contents` through a temporary file renamed into place.
fn write_atomic(path: &Path, contents: &str) -> Result<(), ProjectError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).map_err(io_error(dir))?;
        }
    }

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path).map_err(io_error(&temp_path))?;
    file.write_all(contents.as_bytes())
        .and_then(|_| file.flush())
        .map_err(io_error(&temp_path))?;
    drop(file);

    fs::rename(&temp_path, path).map_err(io_error(path))
}

impl ProjectStore for FileProjectStore {
    fn load(&mut self) -> Result<Project, ProjectError> {
        if !self.path.exists() {
            return Err(ProjectError::NotFound(self.path.clone()));
        }

        let data = fs::read_to_string(&self.path).map_err(io_error(&self.path))?;
        let project: Project = serde_json::from_str(&data).map_err(parse_error(&self.path))?;
        project
            .settings
            .validate()
            .map_err(ProjectError::InvalidSettings)?;

        self.settings = project.settings.clone();
        log::debug!("loaded project {:?} from {}", project.name, self.path.display());
        Ok(project)
    }

    fn save(&mut self, project: &Project) -> Result<(), ProjectError> {
        project
            .settings
            .validate()
            .map_err(ProjectError::InvalidSettings)?;

        let json = serde_json::to_string_pretty(project).map_err(parse_error(&self.path))?;
        write_atomic(&self.path, &json)?;

        self.settings = project.settings.clone();
        Ok(())
    }

    fn append_history(&mut self, entry: &HistoryEntry) -> Result<(), ProjectError> {
        let config = HistoryConfig::from_settings(&self.settings);
        history::append_entry(&self.history_path(), entry, &config)?;
        Ok(())
    }

    fn load_history(&self) -> Result<Vec<HistoryEntry>, ProjectError> {
        Ok(history::load_entries(&self.history_path())?)
    }

    fn clear_history(&mut self) -> Result<(), ProjectError> {
        history::clear_history(&self.history_path())?;
        log::debug!("cleared history at {}", self.history_path().display());
        Ok(())
    }

    fn load_session(&self) -> Result<Session, ProjectError> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(Session::new());
        }

        let data = fs::read_to_string(&path).map_err(io_error(&path))?;
        let mut session: Session = serde_json::from_str(&data).map_err(parse_error(&path))?;
        session.prune(self.settings.cookie_lifetime(), Utc::now());
        Ok(session)
    }

    fn save_session(&mut self, session: &Session) -> Result<(), ProjectError> {
        let path = self.session_path();
        let json = serde_json::to_string_pretty(session).map_err(parse_error(&path))?;
        write_atomic(&path, &json)
    }
}

/// In-memory project store.
#[derive(Debug, Clone, Default)]
pub struct MemoryProjectStore {
    project: Option<Project>,
    history: Vec<HistoryEntry>,
    session: Session,
}

impl MemoryProjectStore {
    /// Creates a store holding `project`.
    pub fn new(project: Project) -> Self {
        Self {
            project: Some(project),
            history: Vec::new(),
            session: Session::new(),
        }
    }

    /// The saved project, if any.
    pub fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    /// Recorded history entries.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// The saved session.
    pub fn session(&self) -> &Session {
        &self.session
    }
}

impl ProjectStore for MemoryProjectStore {
    fn load(&mut self) -> Result<Project, ProjectError> {
        self.project.clone().ok_or(ProjectError::NoProject)
    }

    fn save(&mut self, project: &Project) -> Result<(), ProjectError> {
        self.project = Some(project.clone());
        Ok(())
    }

    fn append_history(&mut self, entry: &HistoryEntry) -> Result<(), ProjectError> {
        self.history.push(entry.clone());
        Ok(())
    }

    fn load_history(&self) -> Result<Vec<HistoryEntry>, ProjectError> {
        Ok(self.history.clone())
    }

    fn clear_history(&mut self) -> Result<(), ProjectError> {
        self.history.clear();
        Ok(())
    }

    fn load_session(&self) -> Result<Session, ProjectError> {
        Ok(self.session.clone())
    }

    fn save_session(&mut self, session: &Session) -> Result<(), ProjectError> {
        self.session = session.clone();
        Ok(())
    }
}
