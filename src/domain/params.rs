use std::path::{Path, PathBuf};

/// Wire prefixes for the semantic field names callers use. Keys ending in
/// `Id` never reach this table, so only the string forms of fields that also
/// have an id form are listed.
const FIELD_PREFIXES: &[(&str, &[&str])] = &[
    ("ix", &["bug", "mailbox", "priority"]),
    (
        "s",
        &[
            "project",
            "category",
            "title",
            "customerEmail",
            "from",
            "to",
            "CC",
            "BCC",
            "subject",
            "event",
            "tags",
            "personAssignedTo",
        ],
    ),
    ("n", &["filesCount"]),
    ("f", &["open"]),
    ("dt", &["opened", "closed"]),
];

const FILES_KEY: &str = "files";

#[derive(Debug, Clone, PartialEq)]
enum Param {
    Field { key: String, value: String },
    Files(Vec<PathBuf>),
}

/// Caller-facing request parameters, keyed by semantic field name.
///
/// Insertion order is kept and a repeated key replaces the earlier value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    entries: Vec<Param>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn files<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        for path in paths {
            self.push_file(path.into());
        }
        self
    }

    /// Sets `key`. The literal key `files` adds an attachment path instead.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if key == FILES_KEY {
            self.push_file(PathBuf::from(value));
            return;
        }

        let existing = self.entries.iter_mut().find_map(|entry| match entry {
            Param::Field { key: current, value } if *current == key => Some(value),
            _ => None,
        });
        match existing {
            Some(slot) => *slot = value,
            None => self.entries.push(Param::Field { key, value }),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|entry| match entry {
            Param::Field { key: current, .. } => current == key,
            Param::Files(_) => key == FILES_KEY,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push_file(&mut self, path: PathBuf) {
        for entry in &mut self.entries {
            if let Param::Files(paths) = entry {
                paths.push(path);
                return;
            }
        }
        self.entries.push(Param::Files(vec![path]));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    File { path: PathBuf, file_name: String },
}

/// One named part of a multipart form body.
#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: String,
    pub value: FormValue,
}

impl FormField {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: FormValue::Text(value.into()),
        }
    }

    pub fn text_value(&self) -> Option<&str> {
        match &self.value {
            FormValue::Text(text) => Some(text),
            FormValue::File { .. } => None,
        }
    }
}

/// Translates semantic parameter names into FogBugz wire names.
pub fn map_params(params: &RequestParams) -> Vec<FormField> {
    let mut fields = Vec::with_capacity(params.entries.len());
    for entry in &params.entries {
        match entry {
            Param::Field { key, value } => fields.push(FormField::text(wire_name(key), value)),
            Param::Files(paths) => {
                fields.push(FormField::text("nFilesCount", paths.len().to_string()));
                for (index, path) in paths.iter().enumerate() {
                    fields.push(FormField {
                        name: format!("File{index}"),
                        value: FormValue::File {
                            path: path.clone(),
                            file_name: base_name(path),
                        },
                    });
                }
            }
        }
    }
    fields
}

fn wire_name(key: &str) -> String {
    if let Some(base) = key.strip_suffix("Id") {
        return format!("ix{}", upper_first(base));
    }

    FIELD_PREFIXES
        .iter()
        .find(|(_, keys)| keys.contains(&key))
        .map(|(prefix, _)| format!("{prefix}{}", upper_first(key)))
        .unwrap_or_else(|| key.to_string())
}

fn upper_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
