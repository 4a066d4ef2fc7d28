//! Index definition sent to the search service on create-or-update.

use serde::Serialize;
use serde_with::skip_serializing_none;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;
pub const HNSW_ALGORITHM: &str = "myHnsw";
pub const EXHAUSTIVE_KNN_ALGORITHM: &str = "myExhaustiveKnn";
pub const HNSW_PROFILE: &str = "myHnswProfile";
pub const EXHAUSTIVE_KNN_PROFILE: &str = "myExhaustiveKnnProfile";
pub const SEMANTIC_CONFIG: &str = "my-semantic-config";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDefinition {
    pub name: String,
    pub fields: Vec<IndexField>,
    pub vector_search: VectorSearch,
    pub semantic: SemanticSearch,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub key: Option<bool>,
    pub searchable: Option<bool>,
    pub filterable: Option<bool>,
    pub sortable: Option<bool>,
    pub facetable: Option<bool>,
    pub dimensions: Option<usize>,
    pub vector_search_profile: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorSearch {
    pub algorithms: Vec<VectorAlgorithm>,
    pub profiles: Vec<VectorProfile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VectorMetric {
    Cosine,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum VectorAlgorithm {
    Hnsw {
        name: String,
        #[serde(rename = "hnswParameters")]
        parameters: HnswParameters,
    },
    ExhaustiveKnn {
        name: String,
        #[serde(rename = "exhaustiveKnnParameters")]
        parameters: ExhaustiveKnnParameters,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HnswParameters {
    pub m: u32,
    pub ef_construction: u32,
    pub ef_search: u32,
    pub metric: VectorMetric,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExhaustiveKnnParameters {
    pub metric: VectorMetric,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorProfile {
    pub name: String,
    pub algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticSearch {
    pub configurations: Vec<SemanticConfiguration>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticConfiguration {
    pub name: String,
    pub prioritized_fields: PrioritizedFields,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrioritizedFields {
    pub prioritized_content_fields: Vec<SemanticField>,
    pub prioritized_keywords_fields: Vec<SemanticField>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticField {
    pub field_name: String,
}

impl IndexDefinition {
    /// The fixed chunk index: key `id`, searchable `line` and `filename`, and
    /// a cosine vector field `embedding` with HNSW and exhaustive k-NN profiles.
    pub fn chunk_index(name: impl Into<String>, dimensions: usize) -> Self {
        let fields = vec![
            IndexField {
                name: "id".to_string(),
                field_type: "Edm.String".to_string(),
                key: Some(true),
                sortable: Some(true),
                filterable: Some(true),
                facetable: Some(true),
                ..Default::default()
            },
            IndexField {
                name: "line".to_string(),
                field_type: "Edm.String".to_string(),
                searchable: Some(true),
                ..Default::default()
            },
            IndexField {
                name: "filename".to_string(),
                field_type: "Edm.String".to_string(),
                searchable: Some(true),
                filterable: Some(true),
                facetable: Some(true),
                ..Default::default()
            },
            IndexField {
                name: "embedding".to_string(),
                field_type: "Collection(Edm.Single)".to_string(),
                searchable: Some(true),
                dimensions: Some(dimensions),
                vector_search_profile: Some(HNSW_PROFILE.to_string()),
                ..Default::default()
            },
        ];

        let vector_search = VectorSearch {
            algorithms: vec![
                VectorAlgorithm::Hnsw {
                    name: HNSW_ALGORITHM.to_string(),
                    parameters: HnswParameters {
                        m: 4,
                        ef_construction: 400,
                        ef_search: 500,
                        metric: VectorMetric::Cosine,
                    },
                },
                VectorAlgorithm::ExhaustiveKnn {
                    name: EXHAUSTIVE_KNN_ALGORITHM.to_string(),
                    parameters: ExhaustiveKnnParameters {
                        metric: VectorMetric::Cosine,
                    },
                },
            ],
            profiles: vec![
                VectorProfile {
                    name: HNSW_PROFILE.to_string(),
                    algorithm: HNSW_ALGORITHM.to_string(),
                },
                VectorProfile {
                    name: EXHAUSTIVE_KNN_PROFILE.to_string(),
                    algorithm: EXHAUSTIVE_KNN_ALGORITHM.to_string(),
                },
            ],
        };

        let semantic = SemanticSearch {
            configurations: vec![SemanticConfiguration {
                name: SEMANTIC_CONFIG.to_string(),
                prioritized_fields: PrioritizedFields {
                    prioritized_content_fields: vec![SemanticField {
                        field_name: "line".to_string(),
                    }],
                    prioritized_keywords_fields: vec![SemanticField {
                        field_name: "filename".to_string(),
                    }],
                },
            }],
        };

        Self {
            name: name.into(),
            fields,
            vector_search,
            semantic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn definition_serializes_to_rest_shape() -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(IndexDefinition::chunk_index("versicherung", 1536))?;

        assert_eq!(value["name"], "versicherung");
        assert_eq!(
            value["fields"][0],
            json!({
                "name": "id",
                "type": "Edm.String",
                "key": true,
                "filterable": true,
                "sortable": true,
                "facetable": true
            })
        );
        assert_eq!(value["fields"][3]["dimensions"], 1536);
        assert_eq!(value["fields"][3]["vectorSearchProfile"], HNSW_PROFILE);
        assert_eq!(
            value["vectorSearch"]["algorithms"][0],
            json!({
                "kind": "hnsw",
                "name": "myHnsw",
                "hnswParameters": {"m": 4, "efConstruction": 400, "efSearch": 500, "metric": "cosine"}
            })
        );
        assert_eq!(
            value["vectorSearch"]["algorithms"][1]["kind"],
            "exhaustiveKnn"
        );
        assert_eq!(
            value["semantic"]["configurations"][0]["prioritizedFields"]["prioritizedKeywordsFields"][0]
                ["fieldName"],
            "filename"
        );
        Ok(())
    }

    #[test]
    fn definition_is_deterministic() {
        assert_eq!(
            IndexDefinition::chunk_index("docs", 8),
            IndexDefinition::chunk_index("docs", 8)
        );
    }
}
