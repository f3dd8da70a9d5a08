use crate::config::toml_config::BuildConfig;
use crate::core::aggregators::{self, DatasetSource};
use crate::core::allow_list::{parse_allow_list, restrict, CodeIndex, StudySetup};
use crate::core::resolver::resolve_substances;
use crate::core::table::{read_table, TableFormat};
use crate::domain::model::BuildArtifact;
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::{BuildError, Result};
use crate::utils::validation::Validate;
use std::sync::Arc;

/// Builds the boxes-by-sex artifact from the registry tables and the yearly
/// dispensation extracts described by a [`BuildConfig`].
pub struct SubstancePipeline<S: Storage> {
    storage: Arc<S>,
    config: BuildConfig,
}

impl<S: Storage + 'static> SubstancePipeline<S> {
    pub fn new(storage: S, config: BuildConfig) -> Self {
        Self {
            storage: Arc::new(storage),
            config,
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    fn reference_format(&self) -> TableFormat {
        TableFormat::tsv().with_encoding(self.config.reference.encoding)
    }

    /// Registry join, then restriction to the studied substances.
    async fn resolve_code_index(&self, setup: &StudySetup) -> Result<CodeIndex> {
        let reference = &self.config.reference;
        let format = self.reference_format();

        let (packagings, compositions) = tokio::try_join!(
            read_table(self.storage.as_ref(), &reference.packagings, format),
            read_table(self.storage.as_ref(), &reference.compositions, format),
        )?;

        let codes = resolve_substances(&packagings, &compositions, &setup.normalizer)?;
        let restricted = restrict(&codes, &setup.studied);
        let index = CodeIndex::build(&restricted, self.config.study.overlap)?;

        tracing::info!("🔗 {} studied product codes", index.len());
        Ok(index)
    }
}

#[async_trait::async_trait]
impl<S: Storage + 'static> Pipeline for SubstancePipeline<S> {
    async fn extract(&self) -> Result<StudySetup> {
        self.config.validate()?;

        let normalizer = self.config.normalizer()?;
        let categories = self.config.category_index(&normalizer)?;

        let allow_list = read_table(
            self.storage.as_ref(),
            &self.config.reference.allow_list,
            self.reference_format(),
        )
        .await?;
        let studied = parse_allow_list(&allow_list, &normalizer);
        if studied.is_empty() {
            tracing::warn!("⚠️ Allow-list {} names no substance", allow_list.source);
        }
        categories.warn_unstudied(&studied);

        Ok(StudySetup {
            studied,
            normalizer,
            categories,
        })
    }

    async fn transform(&self, setup: StudySetup) -> Result<BuildArtifact> {
        let sources: Vec<Arc<DatasetSource>> = self
            .config
            .dataset_sources()?
            .into_iter()
            .map(Arc::new)
            .collect();
        let open_medic = sources
            .first()
            .cloned()
            .ok_or_else(|| BuildError::MissingConfigError {
                field: "datasets.open_medic".to_string(),
            })?;

        let substance_branch = async {
            let index = Arc::new(self.resolve_code_index(&setup).await?);
            aggregators::boxes_by_substance(Arc::clone(&self.storage), &sources, index).await
        };

        // First error drops the other branches.
        let (boxes_by_sex, products_by_year, women_only_products, boxes_by_substance) = tokio::try_join!(
            aggregators::boxes_by_sex(Arc::clone(&self.storage), Arc::clone(&open_medic)),
            aggregators::products_by_year(Arc::clone(&self.storage), Arc::clone(&open_medic)),
            aggregators::women_only_products(Arc::clone(&self.storage), Arc::clone(&open_medic)),
            substance_branch,
        )?;

        let boxes_by_category = setup.categories.group(&boxes_by_substance);

        Ok(BuildArtifact {
            boxes_by_sex,
            products_by_year,
            women_only_products,
            boxes_by_substance,
            boxes_by_category,
        })
    }

    async fn load(&self, artifact: BuildArtifact) -> Result<String> {
        let output_file = self.config.output_file();
        let json = serde_json::to_vec_pretty(&artifact)?;

        tracing::debug!("Writing {} bytes to {}", json.len(), output_file);
        self.storage.write_file(&output_file, &json).await?;

        tracing::info!("📦 Artifact saved: {}", output_file);
        Ok(output_file)
    }
}
