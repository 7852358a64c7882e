use std::collections::BTreeSet;

use serde_json::Value;

use crate::{Error, Result, solr::SolrClient};

/// How a collection name becomes a list of live Solr base URLs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Topology {
	/// Fixed endpoints, tried in order.
	Static(Vec<String>),
	/// Ask a seed node for the collection's active replicas on live nodes.
	ClusterStatus { seeds: Vec<String> },
}
impl Topology {
	pub fn from_config(solr: &sol_config::Solr, cluster: &sol_config::Cluster) -> Self {
		let endpoints = if cluster.endpoints.is_empty() {
			vec![solr.base_url.clone()]
		} else {
			cluster.endpoints.clone()
		};

		match cluster.mode.as_str() {
			"cluster_status" => Self::ClusterStatus { seeds: endpoints },
			_ => Self::Static(endpoints),
		}
	}

	/// Endpoints that can serve admin calls not bound to one collection.
	pub fn seeds(&self) -> &[String] {
		match self {
			Self::Static(endpoints) => endpoints,
			Self::ClusterStatus { seeds } => seeds,
		}
	}

	pub async fn resolve(&self, client: &SolrClient, collection: &str) -> Result<Vec<String>> {
		match self {
			Self::Static(endpoints) => Ok(endpoints.clone()),
			Self::ClusterStatus { seeds } => {
				let status =
					client.cluster_status(seeds, collection).await.map_err(|err| match err {
						Error::Solr { status: 400, message }
							if message.contains("not find collection") =>
							Error::CollectionNotFound(collection.to_string()),
						other => other,
					})?;
				let endpoints = live_replica_urls(&status, collection)?;

				tracing::debug!(
					collection,
					endpoints = endpoints.len(),
					"Resolved collection topology."
				);

				Ok(endpoints)
			},
		}
	}
}

/// Base URLs of active replicas whose node is live, leaders first, then sorted.
pub fn live_replica_urls(status: &Value, collection: &str) -> Result<Vec<String>> {
	let cluster = status
		.get("cluster")
		.ok_or_else(|| Error::InvalidResponse("missing cluster".to_string()))?;
	let shards = cluster
		.get("collections")
		.and_then(|collections| collections.get(collection))
		.ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?
		.get("shards")
		.and_then(Value::as_object)
		.ok_or_else(|| Error::InvalidResponse(format!("collection {collection} has no shards")))?;
	let live_nodes: BTreeSet<&str> = cluster
		.get("live_nodes")
		.and_then(Value::as_array)
		.map(|nodes| nodes.iter().filter_map(Value::as_str).collect())
		.unwrap_or_default();
	let mut leaders = BTreeSet::new();
	let mut followers = BTreeSet::new();

	for shard in shards.values() {
		let Some(replicas) = shard.get("replicas").and_then(Value::as_object) else {
			continue;
		};

		for replica in replicas.values() {
			let field = |key: &str| replica.get(key).and_then(Value::as_str);
			let (Some(base_url), Some(node_name)) = (field("base_url"), field("node_name")) else {
				continue;
			};

			if field("state") != Some("active") || !live_nodes.contains(node_name) {
				continue;
			}

			let base_url = base_url.trim_end_matches('/').to_string();

			if field("leader") == Some("true") {
				leaders.insert(base_url);
			} else {
				followers.insert(base_url);
			}
		}
	}

	let mut endpoints: Vec<String> = leaders.iter().cloned().collect();

	endpoints.extend(followers.into_iter().filter(|url| !leaders.contains(url)));

	if endpoints.is_empty() {
		return Err(Error::Unreachable(format!("collection {collection} has no active replicas")));
	}

	Ok(endpoints)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use crate::{Error, topology::live_replica_urls};

	fn status() -> serde_json::Value {
		json!({
			"cluster": {
				"collections": {
					"unified": {
						"shards": {
							"shard1": {
								"replicas": {
									"core_node1": {
										"base_url": "http://solr2:8983/solr",
										"node_name": "solr2:8983_solr",
										"state": "active"
									},
									"core_node2": {
										"base_url": "http://solr1:8983/solr/",
										"node_name": "solr1:8983_solr",
										"state": "active",
										"leader": "true"
									},
									"core_node3": {
										"base_url": "http://solr3:8983/solr",
										"node_name": "solr3:8983_solr",
										"state": "down"
									}
								}
							},
							"shard2": {
								"replicas": {
									"core_node4": {
										"base_url": "http://solr4:8983/solr",
										"node_name": "solr4:8983_solr",
										"state": "active"
									}
								}
							}
						}
					}
				},
				"live_nodes": ["solr1:8983_solr", "solr2:8983_solr", "solr3:8983_solr"]
			}
		})
	}

	#[test]
	fn keeps_active_replicas_on_live_nodes_leaders_first() {
		let endpoints = live_replica_urls(&status(), "unified").expect("endpoints");

		assert_eq!(endpoints, vec!["http://solr1:8983/solr", "http://solr2:8983/solr"]);
	}

	#[test]
	fn unknown_collection_is_not_found() {
		let err = live_replica_urls(&status(), "missing").expect_err("expected error");

		assert!(matches!(err, Error::CollectionNotFound(name) if name == "missing"));
	}

	#[test]
	fn no_live_replicas_is_unreachable() {
		let mut status = status();

		status["cluster"]["live_nodes"] = json!([]);

		let err = live_replica_urls(&status, "unified").expect_err("expected error");

		assert!(matches!(err, Error::Unreachable(_)));
	}
}
