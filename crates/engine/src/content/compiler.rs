use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::{debug, info};

use super::database::{ActorDef, ActorDefDatabase, ActorDefId};
use crate::movement::ActorProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateDef,
}

#[derive(Debug, Clone)]
pub struct ContentCompileError {
    pub code: ContentErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ContentCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for ContentCompileError {}

/// Compiles every `*.xml` under `defs_dir`, in path order. A defName may appear once.
pub fn compile_actor_defs(defs_dir: &Path) -> Result<ActorDefDatabase, ContentCompileError> {
    let xml_files = collect_xml_files_sorted(defs_dir)
        .map_err(|error| read_error(error.path, error.source))?;

    let mut merged = BTreeMap::<String, ActorDef>::new();
    let mut origin_by_name = BTreeMap::<String, PathBuf>::new();
    for xml_file in &xml_files {
        let raw = fs::read_to_string(xml_file)
            .map_err(|source| read_error(xml_file.clone(), source))?;
        for def in parse_actor_defs(xml_file, &raw)? {
            if let Some(first) = origin_by_name.get(&def.def_name) {
                return Err(ContentCompileError {
                    code: ContentErrorCode::DuplicateDef,
                    message: format!(
                        "duplicate ActorDef '{}'; first defined in {}",
                        def.def_name,
                        first.display()
                    ),
                    file_path: xml_file.clone(),
                    location: None,
                });
            }
            origin_by_name.insert(def.def_name.clone(), xml_file.clone());
            merged.insert(def.def_name.clone(), def);
        }
    }

    let database = ActorDefDatabase::from_defs(merged.into_values().collect());
    info!(
        files = xml_files.len(),
        defs = database.defs().len(),
        dir = %defs_dir.display(),
        "actor_defs_compiled"
    );
    Ok(database)
}

pub fn parse_actor_defs(file_path: &Path, raw: &str) -> Result<Vec<ActorDef>, ContentCompileError> {
    let doc = Document::parse(raw).map_err(|error| ContentCompileError {
        code: ContentErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;

    let root = doc.root_element();
    if root.tag_name().name() != "Defs" {
        return Err(error_at_node(
            ContentErrorCode::InvalidRoot,
            "root element must be <Defs>".to_string(),
            file_path,
            &doc,
            root,
        ));
    }

    let mut defs = Vec::new();
    for child in root.children().filter(|node| node.is_element()) {
        if child.tag_name().name() != "ActorDef" {
            return Err(error_at_node(
                ContentErrorCode::UnknownDefType,
                format!(
                    "unsupported def type <{}>; expected <ActorDef>",
                    child.tag_name().name()
                ),
                file_path,
                &doc,
                child,
            ));
        }
        defs.push(parse_actor_def(file_path, &doc, child)?);
    }
    debug!(file = %file_path.display(), defs = defs.len(), "actor_def_file_parsed");
    Ok(defs)
}

fn parse_actor_def(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> Result<ActorDef, ContentCompileError> {
    let mut seen_fields = HashSet::<String>::new();
    let mut def_name: Option<String> = None;
    let mut label: Option<String> = None;
    let mut profile = ActorProfile::default();
    let mut tags = Vec::new();

    for field in node.children().filter(|child| child.is_element()) {
        let field_name = field.tag_name().name().to_string();
        if !seen_fields.insert(field_name.clone()) {
            return Err(error_at_node(
                ContentErrorCode::DuplicateField,
                format!("duplicate field <{field_name}> in <ActorDef>"),
                file_path,
                doc,
                field,
            ));
        }

        match field_name.as_str() {
            "defName" => def_name = Some(required_text(file_path, doc, field, "defName")?),
            "label" => label = Some(required_text(file_path, doc, field, "label")?),
            "walkSpeed" => profile.walk_speed = positive_number(file_path, doc, field)?,
            "runSpeed" => profile.run_speed = positive_number(file_path, doc, field)?,
            "stepBackSpeed" => profile.step_back_speed = positive_number(file_path, doc, field)?,
            "turnSpeedDegrees" => {
                profile.turn_speed_radians = positive_number(file_path, doc, field)?.to_radians()
            }
            "radius" => profile.radius = positive_number(file_path, doc, field)?,
            "bodyHeight" => profile.body_height = positive_number(file_path, doc, field)?,
            "tags" => tags = parse_tags(file_path, doc, field)?,
            _ => {
                return Err(error_at_node(
                    ContentErrorCode::UnknownField,
                    format!("unknown field <{field_name}> in <ActorDef>"),
                    file_path,
                    doc,
                    field,
                ))
            }
        }
    }

    let Some(def_name) = def_name else {
        return Err(error_at_node(
            ContentErrorCode::MissingField,
            "missing required field <defName> in <ActorDef>".to_string(),
            file_path,
            doc,
            node,
        ));
    };

    Ok(ActorDef {
        id: ActorDefId(0),
        label: label.unwrap_or_else(|| def_name.clone()),
        def_name,
        profile,
        tags,
    })
}

fn parse_tags(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> Result<Vec<String>, ContentCompileError> {
    let mut tags = Vec::new();
    for item in node.children().filter(|child| child.is_element()) {
        if item.tag_name().name() != "li" {
            return Err(error_at_node(
                ContentErrorCode::InvalidValue,
                format!("<tags> may only contain <li>, found <{}>", item.tag_name().name()),
                file_path,
                doc,
                item,
            ));
        }
        tags.push(required_text(file_path, doc, item, "li")?);
    }
    Ok(tags)
}

fn positive_number(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> Result<f32, ContentCompileError> {
    let name = node.tag_name().name();
    let value = required_text(file_path, doc, node, name)?;
    let parsed = value.parse::<f32>().map_err(|_| {
        error_at_node(
            ContentErrorCode::InvalidValue,
            format!("{name} '{value}' is not a valid number"),
            file_path,
            doc,
            node,
        )
    })?;
    if !parsed.is_finite() || parsed <= 0.0 {
        return Err(error_at_node(
            ContentErrorCode::InvalidValue,
            format!("{name} must be finite and > 0"),
            file_path,
            doc,
            node,
        ));
    }
    Ok(parsed)
}

fn required_text(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<String, ContentCompileError> {
    let value = node.text().map(str::trim).unwrap_or_default().to_string();
    if value.is_empty() {
        return Err(error_at_node(
            ContentErrorCode::MissingField,
            format!("field <{field_name}> must not be empty"),
            file_path,
            doc,
            node,
        ));
    }
    Ok(value)
}

fn error_at_node(
    code: ContentErrorCode,
    message: String,
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> ContentCompileError {
    let pos = doc.text_pos_at(node.range().start);
    ContentCompileError {
        code,
        message,
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }),
    }
}

struct ReadError {
    path: PathBuf,
    source: std::io::Error,
}

fn collect_xml_files_sorted(root: &Path) -> Result<Vec<PathBuf>, ReadError> {
    let mut files = Vec::<PathBuf>::new();
    collect_recursive(root, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_recursive(current: &Path, files: &mut Vec<PathBuf>) -> Result<(), ReadError> {
    let entries = fs::read_dir(current).map_err(|source| ReadError {
        path: current.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ReadError {
            path: current.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(&path, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        {
            files.push(path);
        }
    }
    Ok(())
}

fn read_error(path: PathBuf, source: std::io::Error) -> ContentCompileError {
    ContentCompileError {
        code: ContentErrorCode::ReadFile,
        message: format!("failed to read actor defs: {source}"),
        file_path: path,
        location: None,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, content).expect("write");
    }

    #[test]
    fn actor_defs_compile_with_ids_in_def_name_order() {
        let temp = TempDir::new().expect("temp");
        write_file(
            &temp.path().join("actors.xml"),
            r#"<Defs>
                <ActorDef><defName>zeta</defName><runSpeed>6</runSpeed></ActorDef>
                <ActorDef><defName>alpha</defName><label>Alpha</label><tags><li>npc</li><li>guard</li></tags></ActorDef>
            </Defs>"#,
        );
        let db = compile_actor_defs(temp.path()).expect("compile");
        let alpha = db.def_by_name("alpha").expect("alpha");
        let zeta = db.def_by_name("zeta").expect("zeta");
        assert!(alpha.id.0 < zeta.id.0);
        assert_eq!(alpha.tags, vec!["npc".to_string(), "guard".to_string()]);
        assert_eq!(zeta.label, "zeta");
        assert!((zeta.profile.run_speed - 6.0).abs() < f32::EPSILON);
        assert_eq!(zeta.profile.walk_speed, ActorProfile::default().walk_speed);
    }

    #[test]
    fn turn_speed_is_given_in_degrees() {
        let defs = parse_actor_defs(
            Path::new("inline.xml"),
            r#"<Defs><ActorDef><defName>a</defName><turnSpeedDegrees>180</turnSpeedDegrees></ActorDef></Defs>"#,
        )
        .expect("parse");
        assert!((defs[0].profile.turn_speed_radians - std::f32::consts::PI).abs() < 1e-5);
    }

    #[test]
    fn missing_def_name_reports_file_and_location() {
        let temp = TempDir::new().expect("temp");
        write_file(
            &temp.path().join("defs").join("actors.xml"),
            r#"<Defs><ActorDef><label>X</label></ActorDef></Defs>"#,
        );
        let err = compile_actor_defs(temp.path()).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::MissingField);
        assert!(err.file_path.ends_with(Path::new("defs").join("actors.xml")));
        assert!(err.location.is_some());
    }

    #[test]
    fn unknown_actor_field_is_rejected() {
        let err = parse_actor_defs(
            Path::new("inline.xml"),
            r#"<Defs><ActorDef><defName>a</defName><mood>Happy</mood></ActorDef></Defs>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::UnknownField);
    }

    #[test]
    fn non_positive_speed_errors() {
        let err = parse_actor_defs(
            Path::new("inline.xml"),
            r#"<Defs><ActorDef><defName>a</defName><walkSpeed>-1</walkSpeed></ActorDef></Defs>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::InvalidValue);
        assert_eq!(err.location.map(|loc| loc.line), Some(1));
    }

    #[test]
    fn broken_actor_xml_reports_line_and_column() {
        let err = parse_actor_defs(
            Path::new("inline.xml"),
            r#"<Defs><ActorDef><defName>a</defName></Defs>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::XmlMalformed);
        assert!(err.location.is_some());
    }

    #[test]
    fn duplicate_def_across_files_errors() {
        let temp = TempDir::new().expect("temp");
        write_file(
            &temp.path().join("a.xml"),
            r#"<Defs><ActorDef><defName>a</defName></ActorDef></Defs>"#,
        );
        write_file(
            &temp.path().join("b.xml"),
            r#"<Defs><ActorDef><defName>a</defName></ActorDef></Defs>"#,
        );
        let err = compile_actor_defs(temp.path()).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::DuplicateDef);
        assert!(err.file_path.ends_with("b.xml"));
    }
}
