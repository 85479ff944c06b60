//! Decoding and typed extraction of command arguments.

use serde_json::{Map, Value};

use crate::command::codec::BinaryPayload;
use crate::driver::Driver;
use crate::errors::DriverError;
use crate::files::{RenameTarget, WriteData};
use crate::http::HttpOptions;
use crate::resource::{Directory, File, Resource, ResourceDescriptor, Url};

/// One decoded argument.
#[derive(Debug, Clone)]
pub enum Argument {
    Resource(Resource),
    Binary(Vec<u8>),
    Value(Value),
}

/// Positional arguments of one command.
#[derive(Debug, Clone, Default)]
pub struct Args {
    items: Vec<Argument>,
}

impl Args {
    /// Decode raw JSON arguments: `_t` objects become resources,
    /// `_bin` objects become bytes, everything else stays JSON.
    pub async fn decode(driver: &Driver, raw: Vec<Value>) -> Result<Self, DriverError> {
        let mut items = Vec::with_capacity(raw.len());
        for value in raw {
            items.push(decode_argument(driver, value).await?);
        }
        Ok(Self { items })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Argument> {
        self.items.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Argument> {
        self.items.get_mut(index)
    }

    /// The argument at `index`, with JSON `null` treated as absent.
    fn present(&self, index: usize) -> Option<&Argument> {
        match self.items.get(index) {
            None | Some(Argument::Value(Value::Null)) => None,
            Some(arg) => Some(arg),
        }
    }

    pub fn file(&self, index: usize, name: &str) -> Result<File, DriverError> {
        match self.present(index) {
            Some(Argument::Resource(Resource::File(file))) => Ok(file.clone()),
            _ => Err(expected(name, "a file")),
        }
    }

    pub fn directory(&self, index: usize, name: &str) -> Result<Directory, DriverError> {
        match self.present(index) {
            Some(Argument::Resource(Resource::Directory(dir))) => Ok(dir.clone()),
            _ => Err(expected(name, "a directory")),
        }
    }

    pub fn url(&self, index: usize, name: &str) -> Result<Url, DriverError> {
        match self.present(index) {
            Some(Argument::Resource(Resource::Url(url))) => Ok(url.clone()),
            _ => Err(expected(name, "a url")),
        }
    }

    pub fn resource(&self, index: usize, name: &str) -> Result<Resource, DriverError> {
        match self.present(index) {
            Some(Argument::Resource(resource)) => Ok(resource.clone()),
            _ => Err(expected(name, "a file or a directory")),
        }
    }

    pub fn string(&self, index: usize, name: &str) -> Result<String, DriverError> {
        match self.present(index) {
            Some(Argument::Value(Value::String(s))) => Ok(s.clone()),
            _ => Err(expected(name, "a string")),
        }
    }

    /// Optional non-negative integer. Negative numbers count as absent;
    /// fractions are truncated.
    pub fn opt_u64(&self, index: usize, name: &str) -> Result<Option<u64>, DriverError> {
        Ok(self.opt_i64(index, name)?.and_then(|n| u64::try_from(n).ok()))
    }

    pub fn opt_i64(&self, index: usize, name: &str) -> Result<Option<i64>, DriverError> {
        match self.present(index) {
            None => Ok(None),
            Some(Argument::Value(Value::Number(n))) => Ok(n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))),
            Some(_) => Err(expected(name, "a number")),
        }
    }

    /// The payload of `write`: strings stay text, binary stays bytes,
    /// any other JSON value is written as JSON text.
    pub fn write_data(&self, index: usize) -> Result<Option<WriteData>, DriverError> {
        match self.present(index) {
            None => Ok(None),
            Some(Argument::Value(Value::String(s))) => Ok(Some(WriteData::Text(s.clone()))),
            Some(Argument::Value(other)) => Ok(Some(WriteData::Json(other.clone()))),
            Some(Argument::Binary(bytes)) => Ok(Some(WriteData::Bytes(bytes.clone()))),
            Some(Argument::Resource(_)) => Err(expected("data", "a string or binary data")),
        }
    }

    pub fn rename_target(&self, index: usize, name: &str) -> Result<RenameTarget, DriverError> {
        match self.present(index) {
            Some(Argument::Resource(resource)) => Ok(RenameTarget::Resource(resource.clone())),
            Some(Argument::Value(Value::String(s))) => Ok(RenameTarget::Name(s.clone())),
            _ => Err(expected(name, "a file, a directory or a name")),
        }
    }

    /// `httpRequest` options. The `file` (or `_file`) entry is a resource
    /// descriptor and is resolved against `driver`.
    pub async fn http_options(
        &self,
        index: usize,
        driver: &Driver,
    ) -> Result<HttpOptions, DriverError> {
        let mut object = match self.present(index) {
            None => return Ok(HttpOptions::default()),
            Some(Argument::Value(Value::Object(object))) => object.clone(),
            Some(_) => return Err(expected("options", "an object")),
        };
        let file = take_file_descriptor(&mut object);
        let mut options: HttpOptions = serde_json::from_value(Value::Object(object))
            .map_err(|e| DriverError::invalid(format!("Invalid http options: {e}")))?;

        if let Some(descriptor) = file {
            match driver.resolve_descriptor(descriptor?).await? {
                Resource::File(file) => options.file = Some(file),
                _ => return Err(expected("options.file", "a file")),
            }
        }
        Ok(options)
    }
}

fn take_file_descriptor(
    object: &mut Map<String, Value>,
) -> Option<Result<ResourceDescriptor, DriverError>> {
    let value = object.remove("file").or_else(|| object.remove("_file"))?;
    if value.is_null() {
        return None;
    }
    Some(
        serde_json::from_value(value)
            .map_err(|_| expected("options.file", "a file")),
    )
}

async fn decode_argument(driver: &Driver, value: Value) -> Result<Argument, DriverError> {
    if value.get("_t").is_some() {
        let descriptor: ResourceDescriptor = serde_json::from_value(value)
            .map_err(|e| DriverError::invalid(format!("Invalid resource descriptor: {e}")))?;
        return Ok(Argument::Resource(driver.resolve_descriptor(descriptor).await?));
    }
    if let Some(payload) = BinaryPayload::from_value(&value) {
        let payload = payload
            .map_err(|e| DriverError::invalid(format!("Invalid binary payload: {e}")))?;
        return Ok(Argument::Binary(payload.data));
    }
    Ok(Argument::Value(value))
}

fn expected(name: &str, what: &str) -> DriverError {
    DriverError::invalid(format!("The provided parameter '{name}' must be {what}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::permission::Permission;
    use crate::registry::OpenMode;
    use crate::resource::FileId;
    use serde_json::json;
    use tempfile::TempDir;

    fn make_driver(dir: &TempDir) -> Driver {
        Driver::new(DriverConfig::new("test", dir.path(), Permission::ReadWrite))
    }

    #[tokio::test]
    async fn decodes_resources_binary_and_values() {
        let dir = TempDir::new().unwrap();
        let d = make_driver(&dir);
        let args = Args::decode(
            &d,
            vec![
                json!({"_t": "file", "path": "a.txt"}),
                json!({"_bin": "aGk="}),
                json!(12),
                json!(null),
            ],
        )
        .await
        .unwrap();

        assert_eq!(args.len(), 4);
        assert_eq!(args.file(0, "file").unwrap().path(), "a.txt");
        assert!(matches!(args.get(1), Some(Argument::Binary(b)) if b == b"hi"));
        assert_eq!(args.opt_u64(2, "length").unwrap(), Some(12));
        assert_eq!(args.opt_u64(3, "offset").unwrap(), None);
        assert_eq!(args.opt_u64(9, "missing").unwrap(), None);
    }

    #[tokio::test]
    async fn registered_id_resolves_to_open_file() {
        let dir = TempDir::new().unwrap();
        let d = make_driver(&dir);
        let file = d
            .file("open.txt")
            .unwrap()
            .with_encoding(Some("latin1".into()));
        let handle = tokio::fs::File::create(file.absolute_path()).await.unwrap();
        d.registry().insert(file.clone(), OpenMode::Write, handle).await;

        let args = Args::decode(
            &d,
            vec![json!({"_t": "file", "path": "ignored.txt", "id": file.id()})],
        )
        .await
        .unwrap();
        let resolved = args.file(0, "file").unwrap();
        assert_eq!(resolved, file);
        assert_eq!(resolved.encoding(), Some("latin1"));
    }

    #[tokio::test]
    async fn wrong_types_name_the_parameter() {
        let dir = TempDir::new().unwrap();
        let d = make_driver(&dir);
        let args = Args::decode(&d, vec![json!({"_t": "directory", "path": "docs"}), json!("x")])
            .await
            .unwrap();

        let err = args.file(0, "file").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid argument: The provided parameter 'file' must be a file"
        );
        assert!(args.directory(0, "directory").is_ok());
        assert!(matches!(
            args.opt_i64(1, "offset"),
            Err(DriverError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn malformed_payloads_are_invalid_arguments() {
        let dir = TempDir::new().unwrap();
        let d = make_driver(&dir);
        let err = Args::decode(&d, vec![json!({"_t": "socket"})]).await.unwrap_err();
        assert!(matches!(err, DriverError::InvalidArgument(_)));
        let err = Args::decode(&d, vec![json!({"_bin": "!!"})]).await.unwrap_err();
        assert!(matches!(err, DriverError::InvalidArgument(_)));
        let err = Args::decode(&d, vec![json!({"_t": "file", "path": "../x"})])
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn write_data_and_rename_targets() {
        let dir = TempDir::new().unwrap();
        let d = make_driver(&dir);
        let args = Args::decode(
            &d,
            vec![
                json!("text"),
                json!({"_bin": "AA=="}),
                json!({"k": 1}),
                json!({"_t": "file", "path": "b.txt"}),
            ],
        )
        .await
        .unwrap();

        assert_eq!(args.write_data(0).unwrap(), Some(WriteData::Text("text".into())));
        assert_eq!(args.write_data(1).unwrap(), Some(WriteData::Bytes(vec![0])));
        assert_eq!(args.write_data(2).unwrap(), Some(WriteData::Json(json!({"k": 1}))));
        assert_eq!(args.write_data(7).unwrap(), None);
        assert!(matches!(
            args.rename_target(0, "newObj").unwrap(),
            RenameTarget::Name(ref n) if n == "text"
        ));
        assert!(matches!(
            args.rename_target(3, "newObj").unwrap(),
            RenameTarget::Resource(Resource::File(_))
        ));
    }

    #[tokio::test]
    async fn http_options_resolve_nested_file() {
        let dir = TempDir::new().unwrap();
        let d = make_driver(&dir);
        let args = Args::decode(
            &d,
            vec![json!({
                "gzip": false,
                "_file": {"_t": "file", "path": "dl.bin", "id": 77}
            })],
        )
        .await
        .unwrap();

        let options = args.http_options(0, &d).await.unwrap();
        assert!(!options.gzip);
        let file = options.file.unwrap();
        assert_eq!(file.path(), "dl.bin");
        assert_eq!(file.id(), FileId(77));

        let none = Args::default().http_options(0, &d).await.unwrap();
        assert!(none.file.is_none());

        let bad = Args::decode(&d, vec![json!({"file": {"_t": "directory", "path": "x"}})])
            .await
            .unwrap();
        assert!(matches!(
            bad.http_options(0, &d).await,
            Err(DriverError::InvalidArgument(_))
        ));
    }
}
