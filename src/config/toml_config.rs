use crate::core::aggregators::{ColumnLayout, DatasetSource, SexCodes};
use crate::core::allow_list::{CategoryIndex, OverlapPolicy};
use crate::core::normalize::Normalizer;
use crate::core::table::{Encoding, TableFormat};
use crate::utils::error::{BuildError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is a valid regex"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    pub pipeline: PipelineConfig,
    pub reference: ReferenceConfig,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub study: StudyConfig,
    pub datasets: DatasetsConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub description: Option<String>,
}

/// medicaments.gouv.fr registry files and the allow-list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    pub packagings: String,
    pub compositions: String,
    pub allow_list: String,
    #[serde(default)]
    pub encoding: Encoding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    #[serde(default = "default_uncategorized")]
    pub uncategorized: String,
    #[serde(default)]
    pub overlap: OverlapPolicy,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            uncategorized: default_uncategorized(),
            overlap: OverlapPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetsConfig {
    pub open_medic: Option<DatasetConfig>,
    pub open_phmev: Option<DatasetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default)]
    pub encoding: Encoding,
    #[serde(default = "default_true")]
    pub has_header: bool,
    #[serde(default = "default_true")]
    pub quoting: bool,
    pub columns: ColumnLayout,
    #[serde(default)]
    pub sex_codes: SexCodes,
    /// year -> file path
    pub years: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: String,
    #[serde(default = "default_filename")]
    pub filename: String,
}

fn default_uncategorized() -> String {
    "Autres".to_string()
}

fn default_delimiter() -> String {
    ";".to_string()
}

fn default_filename() -> String {
    "data.json".to_string()
}

fn default_true() -> bool {
    true
}

fn resolve_path(root: &Path, path: &mut String) {
    if Path::new(path.as_str()).is_relative() {
        *path = root.join(path.as_str()).to_string_lossy().into_owned();
    }
}

impl DatasetConfig {
    pub fn to_source(&self, field: &str) -> Result<DatasetSource> {
        let delimiter = validation::validate_delimiter(&format!("{}.delimiter", field), &self.delimiter)?;
        let mut format = TableFormat::new(delimiter).with_encoding(self.encoding);
        if !self.quoting {
            format = format.without_quoting();
        }

        Ok(DatasetSource {
            name: self.name.clone(),
            format,
            has_header: self.has_header,
            columns: self.columns,
            sex_codes: self.sex_codes.clone(),
            years: self.years.clone(),
        })
    }

    fn validate_as(&self, field: &str) -> Result<()> {
        validation::validate_non_empty_string(&format!("{}.name", field), &self.name)?;
        validation::validate_delimiter(&format!("{}.delimiter", field), &self.delimiter)?;

        if self.years.is_empty() {
            return Err(BuildError::ConfigValidationError {
                field: format!("{}.years", field),
                message: "at least one year file is required".to_string(),
            });
        }
        for (year, path) in &self.years {
            validation::validate_year(&format!("{}.years", field), year)?;
            validation::validate_path(&format!("{}.years.{}", field, year), path)?;
        }

        if self.sex_codes.homme.iter().any(|c| self.sex_codes.femme.contains(c)) {
            return Err(BuildError::ConfigValidationError {
                field: format!("{}.sex_codes", field),
                message: "a code cannot mean both homme and femme".to_string(),
            });
        }
        Ok(())
    }
}

impl BuildConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BuildError::io(path.display().to_string(), e))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| BuildError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unknown variables are left as is.
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR_PATTERN
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    /// Anchors relative input paths at `root`. The output path stays relative
    /// to the working directory.
    pub fn with_data_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        let root = root.as_ref();
        resolve_path(root, &mut self.reference.packagings);
        resolve_path(root, &mut self.reference.compositions);
        resolve_path(root, &mut self.reference.allow_list);

        for dataset in [&mut self.datasets.open_medic, &mut self.datasets.open_phmev]
            .into_iter()
            .flatten()
        {
            for path in dataset.years.values_mut() {
                resolve_path(root, path);
            }
        }
        self
    }

    pub fn open_medic(&self) -> Result<&DatasetConfig> {
        validation::validate_required_field("datasets.open_medic", &self.datasets.open_medic)
    }

    /// Open Medic first, then PHMEV when configured.
    pub fn dataset_sources(&self) -> Result<Vec<DatasetSource>> {
        let mut sources = vec![self.open_medic()?.to_source("datasets.open_medic")?];
        if let Some(phmev) = &self.datasets.open_phmev {
            sources.push(phmev.to_source("datasets.open_phmev")?);
        }
        Ok(sources)
    }

    pub fn normalizer(&self) -> Result<Normalizer> {
        Normalizer::with_aliases(&self.aliases)
    }

    pub fn category_index(&self, normalizer: &Normalizer) -> Result<CategoryIndex> {
        CategoryIndex::new(&self.categories, self.study.uncategorized.clone(), normalizer)
    }

    /// Artifact location, relative to the storage root.
    pub fn output_file(&self) -> String {
        Path::new(&self.output.path)
            .join(&self.output.filename)
            .to_string_lossy()
            .into_owned()
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("pipeline.name", &self.pipeline.name)?;
        validation::validate_path("reference.packagings", &self.reference.packagings)?;
        validation::validate_path("reference.compositions", &self.reference.compositions)?;
        validation::validate_path("reference.allow_list", &self.reference.allow_list)?;
        validation::validate_path("output.path", &self.output.path)?;
        validation::validate_path("output.filename", &self.output.filename)?;
        validation::validate_non_empty_string("study.uncategorized", &self.study.uncategorized)?;

        let open_medic = self.open_medic()?;
        open_medic.validate_as("datasets.open_medic")?;

        if let Some(phmev) = &self.datasets.open_phmev {
            phmev.validate_as("datasets.open_phmev")?;
            Self::check_same_years(("open_medic", open_medic), ("open_phmev", phmev))?;
        }

        let normalizer = self.normalizer()?;
        self.category_index(&normalizer)?;
        Ok(())
    }

    /// Every year of one family must be configured for the other.
    fn check_same_years(
        (left_name, left): (&str, &DatasetConfig),
        (right_name, right): (&str, &DatasetConfig),
    ) -> Result<()> {
        for (year_of, name_of, other, other_name) in [
            (left, left_name, right, right_name),
            (right, right_name, left, left_name),
        ] {
            if let Some(year) = year_of.years.keys().find(|y| !other.years.contains_key(*y)) {
                return Err(BuildError::config(format!(
                    "year {} is configured for {} but has no file in {}",
                    year, name_of, other_name
                )));
            }
        }
        Ok(())
    }

    pub fn years(&self) -> Vec<String> {
        self.datasets
            .open_medic
            .as_ref()
            .map(|d| d.years.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Validate for BuildConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
