//! bcp command construction.
//!
//! Building the argument list is kept apart from running it so the exact
//! invocation can be inspected, logged (redacted) and tested.

use std::fmt;

const REDACTED: &str = "***";

/// A fully specified `bcp <query> queryout <file>` invocation.
#[derive(Clone)]
pub struct BcpCommand {
    launcher: Option<String>,
    program: String,
    query: String,
    output_path: String,
    delimiter: String,
    row_terminator: Option<String>,
    server: String,
    database: String,
    user: String,
    password: String,
    batch_size: Option<u32>,
    packet_size: Option<u32>,
    trust_server_cert: bool,
}

impl BcpCommand {
    /// Start a command exporting `query` into `output_path` in character mode.
    pub fn new(
        program: impl Into<String>,
        query: impl Into<String>,
        output_path: impl Into<String>,
    ) -> Self {
        Self {
            launcher: None,
            program: program.into(),
            query: query.into(),
            output_path: output_path.into(),
            delimiter: ",".to_string(),
            row_terminator: None,
            server: String::new(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            batch_size: None,
            packet_size: None,
            trust_server_cert: false,
        }
    }

    /// Run bcp through a compatibility-layer launcher (e.g. `wsl`).
    pub fn launcher(mut self, launcher: impl Into<String>) -> Self {
        self.launcher = Some(launcher.into());
        self
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn row_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.row_terminator = Some(terminator.into());
        self
    }

    /// Server, database and SQL login.
    pub fn connection(
        mut self,
        server: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.server = server.into();
        self.database = database.into();
        self.user = user.into();
        self.password = password.into();
        self
    }

    pub fn batch_size(mut self, rows: u32) -> Self {
        self.batch_size = Some(rows);
        self
    }

    pub fn packet_size(mut self, bytes: u32) -> Self {
        self.packet_size = Some(bytes);
        self
    }

    /// Trust the server certificate (`-u`, mssql-tools 18).
    pub fn trust_server_cert(mut self, trust: bool) -> Self {
        self.trust_server_cert = trust;
        self
    }

    /// Executable to spawn: the launcher when set, otherwise bcp itself.
    pub fn program(&self) -> &str {
        self.launcher.as_deref().unwrap_or(&self.program)
    }

    /// Arguments to pass to [`program`](Self::program), password included.
    pub fn args(&self) -> Vec<String> {
        self.build_args(&self.password)
    }

    /// Arguments with the password replaced by `***`.
    pub fn redacted_args(&self) -> Vec<String> {
        self.build_args(REDACTED)
    }

    fn build_args(&self, password: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(24);
        if self.launcher.is_some() {
            args.push(self.program.clone());
        }
        args.push(self.query.clone());
        args.push("queryout".to_string());
        args.push(self.output_path.clone());
        args.push("-c".to_string());
        args.push("-t".to_string());
        args.push(self.delimiter.clone());
        if let Some(rt) = &self.row_terminator {
            args.push("-r".to_string());
            args.push(rt.clone());
        }
        args.push("-S".to_string());
        args.push(self.server.clone());
        args.push("-d".to_string());
        args.push(self.database.clone());
        args.push("-U".to_string());
        args.push(self.user.clone());
        args.push("-P".to_string());
        args.push(password.to_string());
        if let Some(b) = self.batch_size {
            args.push("-b".to_string());
            args.push(b.to_string());
        }
        if let Some(a) = self.packet_size {
            args.push("-a".to_string());
            args.push(a.to_string());
        }
        if self.trust_server_cert {
            args.push("-u".to_string());
        }
        args
    }
}

impl fmt::Display for BcpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program())?;
        for arg in self.redacted_args() {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for BcpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BcpCommand")
            .field("program", &self.program())
            .field("args", &self.redacted_args())
            .finish()
    }
}

/// Translate a Windows path (`C:\data\out.csv`) to its WSL mount
/// (`/mnt/c/data/out.csv`). Paths without a drive letter are returned as-is.
pub fn to_wsl_path(path: &str) -> String {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        let drive = (bytes[0] as char).to_ascii_lowercase();
        let rest = path[2..].replace('\\', "/");
        let rest = rest.trim_start_matches('/');
        if rest.is_empty() {
            format!("/mnt/{}", drive)
        } else {
            format!("/mnt/{}/{}", drive, rest)
        }
    } else {
        path.to_string()
    }
}
