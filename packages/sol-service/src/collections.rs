use serde::{Deserialize, Serialize};

use sol_domain::schema::{self, FieldRole};
use sol_storage::models::FieldInfo;

use crate::{Result, SolService};

#[derive(Clone, Debug, Serialize)]
pub struct CollectionsResponse {
	pub default_collection: String,
	pub collections: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldsRequest {
	#[serde(default)]
	pub collection: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FieldView {
	#[serde(flatten)]
	pub info: FieldInfo,
	/// Role from the configured schema map, when the field is mapped.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub role: Option<FieldRole>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FieldsResponse {
	pub collection: String,
	pub fields: Vec<FieldView>,
}

impl SolService {
	pub async fn list_collections(&self) -> Result<CollectionsResponse> {
		let seeds = self.providers.topology.seeds();
		let collections = self.providers.index.list_collections(&seeds).await?;

		tracing::debug!(count = collections.len(), "Listed collections.");

		Ok(CollectionsResponse {
			default_collection: self.cfg.solr.default_collection.clone(),
			collections,
		})
	}

	pub async fn list_fields(&self, req: FieldsRequest) -> Result<FieldsResponse> {
		let collection = req
			.collection
			.as_deref()
			.map(str::trim)
			.filter(|name| !name.is_empty())
			.unwrap_or(&self.cfg.solr.default_collection)
			.to_string();

		schema::validate_collection_name(&collection)?;

		let endpoints = self.providers.topology.resolve(&collection).await?;
		let fields = self
			.providers
			.index
			.list_fields(&endpoints, &collection)
			.await?
			.into_iter()
			.map(|info| {
				let role = self.schema.role(&info.name);

				FieldView { info, role }
			})
			.collect();

		Ok(FieldsResponse { collection, fields })
	}
}
