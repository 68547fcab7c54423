//! Shared fixtures for export tests.

#![allow(dead_code)]

use fieldsync_export::{ExportConfiguration, ExportContext, ExportEvent};
use fieldsync_job::RecordingSink;
use fieldsync_model::{FormMetadata, FormModel, InMemoryMetadataStore, Workspace};
use fieldsync_types::FormKey;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A form with a geopoint, a select-multiple, an attachment and a
/// two-level repeat (`outer` holding `inner`).
pub const SURVEY_FORM: &str = r#"<?xml version="1.0"?>
<h:html xmlns="http://www.w3.org/2002/xforms" xmlns:h="http://www.w3.org/1999/xhtml" xmlns:jr="http://openrosa.org/javarosa">
  <h:head>
    <h:title>Survey</h:title>
    <model>
      <instance>
        <data id="survey" version="3">
          <name/>
          <location/>
          <fruit/>
          <photo/>
          <outer jr:template="">
            <label/>
            <inner jr:template="">
              <count/>
            </inner>
          </outer>
          <meta><instanceID/></meta>
        </data>
      </instance>
      <bind nodeset="/data/name" type="string"/>
      <bind nodeset="/data/location" type="geopoint"/>
      <bind nodeset="/data/fruit" type="select"/>
      <bind nodeset="/data/photo" type="binary"/>
      <bind nodeset="/data/outer/label" type="string"/>
      <bind nodeset="/data/outer/inner/count" type="int"/>
      <bind nodeset="/data/meta/instanceID" type="string" readonly="true()"/>
    </model>
  </h:head>
  <h:body>
    <input ref="/data/name"><label>Name</label></input>
    <input ref="/data/location"><label>Where</label></input>
    <select ref="/data/fruit">
      <item><label>Apple</label><value>apple</value></item>
      <item><label>Pear</label><value>pear</value></item>
      <item><label>Banana</label><value>banana</value></item>
    </select>
    <upload ref="/data/photo" mediatype="image/*"/>
    <group ref="/data/outer">
      <repeat nodeset="/data/outer">
        <input ref="label"/>
        <group ref="inner">
          <repeat nodeset="/data/outer/inner"><input ref="count"/></repeat>
        </group>
      </repeat>
    </group>
  </h:body>
</h:html>"#;

pub fn survey_key() -> FormKey {
    FormKey::new("survey", Some("3".to_string())).unwrap()
}

pub fn survey_model() -> FormModel {
    FormModel::parse(SURVEY_FORM).unwrap()
}

/// Builder for survey submission documents.
#[derive(Clone)]
pub struct SurveySubmission {
    pub instance_id: String,
    pub date: Option<String>,
    pub name: String,
    pub location: String,
    pub fruit: String,
    pub photo: String,
    /// One entry per `outer` occurrence: its label and its `inner` counts.
    pub outer: Vec<(String, Vec<u32>)>,
}

impl SurveySubmission {
    pub fn new(instance_id: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            date: Some("2024-03-01T10:00:00.000Z".to_string()),
            name: format!("name of {instance_id}"),
            location: "12.5 -8.25 100 5".to_string(),
            fruit: "apple banana".to_string(),
            photo: String::new(),
            outer: vec![("first".to_string(), vec![1]), ("second".to_string(), vec![2])],
        }
    }

    pub fn date(mut self, date: Option<&str>) -> Self {
        self.date = date.map(str::to_string);
        self
    }

    pub fn location(mut self, location: &str) -> Self {
        self.location = location.to_string();
        self
    }

    pub fn photo(mut self, photo: &str) -> Self {
        self.photo = photo.to_string();
        self
    }

    pub fn outer(mut self, outer: Vec<(&str, Vec<u32>)>) -> Self {
        self.outer = outer
            .into_iter()
            .map(|(label, counts)| (label.to_string(), counts))
            .collect();
        self
    }

    pub fn xml(&self) -> String {
        let date = self
            .date
            .as_deref()
            .map(|d| format!(r#" submissionDate="{d}""#))
            .unwrap_or_default();
        let outer: String = self
            .outer
            .iter()
            .map(|(label, counts)| {
                let inner: String = counts
                    .iter()
                    .map(|c| format!("<inner><count>{c}</count></inner>"))
                    .collect();
                format!("<outer><label>{label}</label>{inner}</outer>")
            })
            .collect();
        format!(
            r#"<data id="survey" version="3" instanceID="{id}"{date}><name>{name}</name><location>{location}</location><fruit>{fruit}</fruit><photo>{photo}</photo>{outer}<meta><instanceID>{id}</instanceID></meta></data>"#,
            id = self.instance_id,
            name = self.name,
            location = self.location,
            fruit = self.fruit,
            photo = self.photo,
        )
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub workspace: Workspace,
    pub store: Arc<InMemoryMetadataStore>,
    pub sink: Arc<RecordingSink<ExportEvent>>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path().join("workspace"));
        Self {
            dir,
            workspace,
            store: Arc::new(InMemoryMetadataStore::new()),
            sink: Arc::new(RecordingSink::new()),
        }
    }

    pub fn context(&self) -> ExportContext {
        ExportContext::new(self.workspace.clone(), self.store.clone()).with_sink(self.sink.clone())
    }

    /// Survey metadata with its definition on disk.
    pub fn installed_form(&self) -> FormMetadata {
        let form = self.workspace.form_metadata(survey_key(), "Survey");
        write(&form.form_file, SURVEY_FORM.as_bytes());
        form
    }

    pub fn add(&self, form: &FormMetadata, submission: &SurveySubmission) -> PathBuf {
        let file = form.submission_file(&submission.instance_id);
        write(&file, submission.xml().as_bytes());
        file
    }

    /// Stores a document that is not valid XML.
    pub fn add_broken(&self, form: &FormMetadata, dir_name: &str) -> PathBuf {
        let file = form.instances_dir().join(dir_name).join("submission.xml");
        write(&file, b"<data><name>oops</data>");
        file
    }

    pub fn export_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    pub fn config(&self) -> ExportConfiguration {
        ExportConfiguration::new(self.export_dir())
    }

    pub fn out(&self, name: &str) -> PathBuf {
        self.export_dir().join(name)
    }

    pub fn events(&self) -> Vec<ExportEvent> {
        self.sink.events()
    }

    pub fn skipped(&self) -> Vec<ExportEvent> {
        self.events().into_iter().filter(|e| e.is_skip()).collect()
    }
}

pub fn write(path: &Path, contents: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// Reads a CSV file as records, header included.
pub fn read_csv(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

/// Value of `column` in every data row.
pub fn column(records: &[Vec<String>], column: &str) -> Vec<String> {
    let index = records[0]
        .iter()
        .position(|h| h == column)
        .unwrap_or_else(|| panic!("no column {column} in {:?}", records[0]));
    records[1..].iter().map(|r| r[index].clone()).collect()
}
