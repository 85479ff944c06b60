//! Command dispatch: a `{cmd, server, args}` envelope in, a
//! [`CommandOutput`] out.
//!
//! The dispatcher only decodes arguments and routes to the matching
//! driver operation. Results and errors come back unchanged.

pub mod args;
pub mod codec;
pub mod output;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::driver::Driver;
use crate::errors::DriverError;
use crate::http::ProgressListener;
use crate::resource::Resource;

pub use args::{Args, Argument};
pub use output::CommandOutput;

/// Every operation reachable through an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    CreateFile,
    OpenFile,
    OpenFileForAppend,
    Close,
    FileExists,
    Read,
    ReadAll,
    Write,
    CopyFile,
    RenameObject,
    DeleteFile,
    FileLength,
    FileDateTime,
    ZipFile,
    ZipDirectory,
    Unzip,
    MkDir,
    DirExists,
    CopyDir,
    RemoveDirRecursive,
    ReadDirectory,
    HttpRequest,
}

const COMMAND_TABLE: &[(&str, Command)] = &[
    ("createFile", Command::CreateFile),
    ("openFile", Command::OpenFile),
    ("openFileForAppend", Command::OpenFileForAppend),
    ("close", Command::Close),
    ("fileExists", Command::FileExists),
    ("read", Command::Read),
    ("readAll", Command::ReadAll),
    ("write", Command::Write),
    ("copyFile", Command::CopyFile),
    ("renameObject", Command::RenameObject),
    ("deleteFile", Command::DeleteFile),
    ("fileLength", Command::FileLength),
    ("fileDateTime", Command::FileDateTime),
    ("zipFile", Command::ZipFile),
    ("zipDirectory", Command::ZipDirectory),
    ("unzip", Command::Unzip),
    ("mkDir", Command::MkDir),
    ("dirExists", Command::DirExists),
    ("copyDir", Command::CopyDir),
    ("removeDirRecursive", Command::RemoveDirRecursive),
    ("readDirectory", Command::ReadDirectory),
    ("httpRequest", Command::HttpRequest),
];

impl Command {
    /// Look up a command by its wire name.
    pub fn from_name(name: &str) -> Result<Self, DriverError> {
        COMMAND_TABLE
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, c)| *c)
            .ok_or_else(|| DriverError::UnknownCommand(name.to_string()))
    }

    pub fn name(self) -> &'static str {
        COMMAND_TABLE
            .iter()
            .find(|(_, c)| *c == self)
            .map(|(n, _)| *n)
            .unwrap_or("unknown")
    }

    /// Wire names of all commands, in table order.
    pub fn names() -> impl Iterator<Item = &'static str> {
        COMMAND_TABLE.iter().map(|(n, _)| *n)
    }
}

/// A command as received from the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandEnvelope {
    pub cmd: String,
    /// Caller context, attached to resources for tracing only.
    #[serde(default)]
    pub server: Value,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Driver {
    pub async fn execute(&self, envelope: CommandEnvelope) -> Result<CommandOutput, DriverError> {
        self.execute_with_listener(envelope, None).await
    }

    /// Execute `envelope`. `listener`, when given, is attached to every URL
    /// argument so HTTP transfers report progress to it.
    pub async fn execute_with_listener(
        &self,
        envelope: CommandEnvelope,
        listener: Option<Arc<dyn ProgressListener>>,
    ) -> Result<CommandOutput, DriverError> {
        let command = Command::from_name(&envelope.cmd)?;
        if envelope.server.is_null() {
            debug!("[{}] {}", self.name(), command.name());
        } else {
            debug!("[{}] {} (server {})", self.name(), command.name(), envelope.server);
        }

        let mut args = Args::decode(self, envelope.args).await?;
        if let Some(listener) = listener {
            attach_listener(&mut args, listener);
        }
        self.run(command, &args).await
    }

    async fn run(&self, command: Command, args: &Args) -> Result<CommandOutput, DriverError> {
        use CommandOutput as Out;

        let output = match command {
            Command::CreateFile => {
                self.create_file(&args.file(0, "file")?).await?;
                Out::Unit
            }
            Command::OpenFile => {
                self.open_file(&args.file(0, "file")?).await?;
                Out::Unit
            }
            Command::OpenFileForAppend => {
                self.open_file_for_append(&args.file(0, "file")?).await?;
                Out::Unit
            }
            Command::Close => {
                self.close(&args.file(0, "file")?).await?;
                Out::Unit
            }
            Command::FileExists => Out::Bool(self.file_exists(&args.file(0, "file")?).await?),
            Command::Read => {
                let file = args.file(0, "file")?;
                let length = args.opt_u64(1, "length")?;
                let offset = args.opt_u64(2, "offset")?;
                Out::Bytes(self.read(&file, length, offset).await?)
            }
            Command::ReadAll => Out::Text(self.read_all(&args.file(0, "file")?).await?),
            Command::Write => {
                let file = args.file(0, "file")?;
                self.write(
                    &file,
                    args.write_data(1)?,
                    args.opt_i64(2, "offset")?,
                    args.opt_u64(3, "length")?,
                    args.opt_u64(4, "position")?,
                )
                .await?;
                Out::Unit
            }
            Command::CopyFile => {
                self.copy_file(&args.file(0, "file")?, &args.file(1, "newFile")?)
                    .await?;
                Out::Unit
            }
            Command::RenameObject => {
                let obj = args.resource(0, "obj")?;
                self.rename_object(&obj, args.rename_target(1, "newObj")?)
                    .await?;
                Out::Unit
            }
            Command::DeleteFile => {
                self.delete_file(&args.file(0, "file")?).await?;
                Out::Unit
            }
            Command::FileLength => Out::Size(self.file_length(&args.file(0, "file")?).await?),
            Command::FileDateTime => {
                Out::DateTime(self.file_date_time(&args.file(0, "file")?).await?)
            }
            Command::ZipFile => {
                self.zip_file(&args.file(0, "file")?, &args.file(1, "zipFile")?)
                    .await?;
                Out::Unit
            }
            Command::ZipDirectory => {
                self.zip_directory(&args.directory(0, "directory")?, &args.file(1, "zipFile")?)
                    .await?;
                Out::Unit
            }
            Command::Unzip => {
                self.unzip(&args.file(0, "file")?, &args.directory(1, "directory")?)
                    .await?;
                Out::Unit
            }
            Command::MkDir => {
                self.mk_dir(&args.directory(0, "directory")?).await?;
                Out::Unit
            }
            Command::DirExists => {
                Out::Bool(self.dir_exists(&args.directory(0, "directory")?).await?)
            }
            Command::CopyDir => {
                self.copy_dir(&args.directory(0, "srcDir")?, &args.directory(1, "dstDir")?)
                    .await?;
                Out::Unit
            }
            Command::RemoveDirRecursive => {
                self.remove_dir_recursive(&args.directory(0, "directory")?)
                    .await?;
                Out::Unit
            }
            Command::ReadDirectory => {
                let directory = args.directory(0, "directory")?;
                let depth = args.opt_i64(1, "depth")?;
                Out::Entries(self.read_directory(&directory, depth).await?)
            }
            Command::HttpRequest => {
                let url = args.url(0, "url")?;
                let method = args.string(1, "method")?;
                let options = args.http_options(2, self).await?;
                Out::Http(self.http_request(&url, &method, options).await?)
            }
        };
        Ok(output)
    }
}

fn attach_listener(args: &mut Args, listener: Arc<dyn ProgressListener>) {
    for index in 0..args.len() {
        if let Some(Argument::Resource(Resource::Url(url))) = args.get_mut(index) {
            *url = url.clone().with_listener(listener.clone());
        }
    }
}
