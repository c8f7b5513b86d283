//! Catalogue of the BBBC datasets.
//!
//! Each entry is plain data: an id, a title, whether the images are 3D, the
//! variants it accepts, and a function that turns a variant into a
//! [`DatasetDescriptor`]. The cache itself knows nothing about individual
//! datasets.

use crate::descriptor::DatasetDescriptor;
use crate::error::{BbbcError, Result};

const BASE_URL: &str = "https://data.broadinstitute.org/bbbc";

/// A dataset selectable by id, optionally with a variant.
#[derive(Clone, Copy)]
pub struct DatasetInfo {
    pub id: &'static str,
    pub title: &'static str,
    pub is_3d: bool,
    /// Accepted variant names; empty for datasets without variants.
    pub variants: &'static [&'static str],
    pub default_variant: Option<&'static str>,
    build: fn(Option<&str>) -> DatasetDescriptor,
}

impl DatasetInfo {
    /// Resolve `variant` (or the default) into a cache name and descriptor.
    ///
    /// The cache name is the dataset id, suffixed with the variant when the
    /// dataset has variants, so every variant gets its own cache root.
    pub fn descriptor(&self, variant: Option<&str>) -> Result<(String, DatasetDescriptor)> {
        let variant = self.resolve_variant(variant)?;
        let name = match variant {
            Some(v) => format!("{}_{}", self.id, cache_suffix(self.id, v)),
            None => self.id.to_string(),
        };
        Ok((name, (self.build)(variant)))
    }

    fn resolve_variant(&self, variant: Option<&str>) -> Result<Option<&'static str>> {
        if self.variants.is_empty() {
            return match variant {
                None => Ok(None),
                Some(v) => Err(BbbcError::config(format!(
                    "{} has no variants, got {:?}",
                    self.id, v
                ))),
            };
        }

        let requested = variant
            .or(self.default_variant)
            .ok_or_else(|| BbbcError::config(format!("{} requires a variant", self.id)))?;
        match self.variants.iter().copied().find(|v| *v == requested) {
            Some(v) => Ok(Some(v)),
            None => Err(BbbcError::config(format!(
                "Invalid variant {:?} for {}. Choose from {:?}",
                requested, self.id, self.variants
            ))),
        }
    }
}

impl std::fmt::Debug for DatasetInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetInfo")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("is_3d", &self.is_3d)
            .field("variants", &self.variants)
            .field("default_variant", &self.default_variant)
            .finish()
    }
}

/// BBBC027 variants are spelled `low`/`high` but stored as `lowSNR`/`highSNR`.
fn cache_suffix(id: &str, variant: &str) -> String {
    match id {
        "BBBC027" => format!("{}SNR", variant),
        _ => variant.to_string(),
    }
}

fn url(dataset: &str, file: &str) -> String {
    format!("{}/{}/{}", BASE_URL, dataset, file)
}

fn bbbc003(_: Option<&str>) -> DatasetDescriptor {
    DatasetDescriptor::new()
        .with_urls("image_paths", [url("BBBC003", "BBBC003_v1_images.zip")])
        .with_url("segmentation_path", url("BBBC003", "BBBC003_v1_foreground.zip"))
        .with_urls("metadata_paths", [url("BBBC003", "BBBC003_v1_counts.txt")])
}

fn bbbc004(variant: Option<&str>) -> DatasetDescriptor {
    let prob = variant.unwrap_or("000");
    DatasetDescriptor::new()
        .with_urls(
            "image_paths",
            [url("BBBC004", &format!("BBBC004_v1_{}_images.zip", prob))],
        )
        .with_url(
            "segmentation_path",
            url("BBBC004", &format!("BBBC004_v1_{}_foreground.zip", prob)),
        )
        .with_urls("metadata_paths", Vec::<String>::new())
}

fn bbbc005(_: Option<&str>) -> DatasetDescriptor {
    DatasetDescriptor::new()
        .with_urls("image_paths", [url("BBBC005", "BBBC005_v1_images.zip")])
        .with_url("label_path", url("BBBC005", "BBBC005_v1_ground_truth.zip"))
        .with_urls("metadata_paths", [url("BBBC005", "BBBC005_results_bray.csv")])
}

fn bbbc008(_: Option<&str>) -> DatasetDescriptor {
    DatasetDescriptor::new()
        .with_urls("image_paths", [url("BBBC008", "BBBC008_v1_images.zip")])
        .with_url("segmentation_path", url("BBBC008", "BBBC008_v1_foreground.zip"))
        .with_urls("metadata_paths", Vec::<String>::new())
}

fn bbbc010(_: Option<&str>) -> DatasetDescriptor {
    DatasetDescriptor::new()
        .with_urls("image_paths", [url("BBBC010", "BBBC010_v2_images.zip")])
        .with_url("segmentation_path", url("BBBC010", "BBBC010_v1_foreground.zip"))
        .with_urls(
            "additional_segmentation_paths",
            [url("BBBC010", "BBBC010_v1_foreground_eachworm.zip")],
        )
        .with_urls("metadata_paths", Vec::<String>::new())
}

fn bbbc027(variant: Option<&str>) -> DatasetDescriptor {
    let snr = cache_suffix("BBBC027", variant.unwrap_or("high"));
    let parts = |kind: &str| {
        (1..=3)
            .map(|part| url("BBBC027", &format!("BBBC027_{}_{}_part{}.zip", snr, kind, part)))
            .collect::<Vec<_>>()
    };
    DatasetDescriptor::new()
        .with_urls("image_paths", parts("images"))
        .with_urls("segmentation_path", parts("foreground"))
        .with_urls("metadata_paths", Vec::<String>::new())
}

fn bbbc028(_: Option<&str>) -> DatasetDescriptor {
    DatasetDescriptor::new()
        .with_urls("image_paths", [url("BBBC028", "images.zip")])
        .with_url("segmentation_path", url("BBBC028", "ground_truth.zip"))
        .with_urls("metadata_paths", Vec::<String>::new())
}

fn bbbc029(_: Option<&str>) -> DatasetDescriptor {
    DatasetDescriptor::new()
        .with_urls("image_paths", [url("BBBC029", "images.zip")])
        .with_url("segmentation_path", url("BBBC029", "ground_truth.zip"))
        .with_urls("metadata_paths", Vec::<String>::new())
}

fn bbbc033(_: Option<&str>) -> DatasetDescriptor {
    DatasetDescriptor::new()
        .with_urls("image_paths", [url("BBBC033", "BBBC033_v1_dataset.zip")])
        .with_url("label_path", url("BBBC033", "BBBC033DatasetGroundTruth.tif"))
        .with_urls("metadata_paths", Vec::<String>::new())
}

fn bbbc038(variant: Option<&str>) -> DatasetDescriptor {
    let version = variant.unwrap_or("stage1_train");
    let train = version == "stage1_train";
    let stage2 = version == "stage2_test_final";
    let metadata = crate::descriptor::RoleSource::Many(vec![
        Some(url("BBBC038", "metadata.xlsx")),
        train.then(|| url("BBBC038", "stage1_solution.csv")),
        stage2.then(|| url("BBBC038", "stage2_solution_final.csv")),
    ]);
    DatasetDescriptor::new()
        .with_urls("image_paths", [url("BBBC038", &format!("{}.zip", version))])
        .with_optional_url(
            "label_path",
            train.then(|| url("BBBC038", "stage1_train_labels.csv")),
        )
        .with_source("metadata_paths", metadata)
}

fn bbbc039(_: Option<&str>) -> DatasetDescriptor {
    DatasetDescriptor::new()
        .with_urls("image_paths", [url("BBBC039", "images.zip")])
        .with_url("label_path", url("BBBC039", "masks.zip"))
        .with_urls("metadata_paths", [url("BBBC039", "metadata.zip")])
}

fn bbbc046(variant: Option<&str>) -> DatasetDescriptor {
    let sequence = variant.unwrap_or("WT-ID550");
    DatasetDescriptor::new()
        .with_urls("image_paths", [url("BBBC046", &format!("{}.zip", sequence))])
        // Masks and metadata are generated alongside the images.
        .with_optional_url("segmentation_path", None)
        .with_urls("metadata_paths", Vec::<String>::new())
}

static DATASETS: &[DatasetInfo] = &[
    DatasetInfo {
        id: "BBBC003",
        title: "DIC microscopy images of mouse embryos",
        is_3d: false,
        variants: &[],
        default_variant: None,
        build: bbbc003,
    },
    DatasetInfo {
        id: "BBBC004",
        title: "Synthetic nuclei with varying clustering probability",
        is_3d: false,
        variants: &["000", "015", "030", "045", "060"],
        default_variant: Some("000"),
        build: bbbc004,
    },
    DatasetInfo {
        id: "BBBC005",
        title: "Simulated fluorescence images with varying focus blur",
        is_3d: false,
        variants: &[],
        default_variant: None,
        build: bbbc005,
    },
    DatasetInfo {
        id: "BBBC008",
        title: "Human HT29 colon cancer cells",
        is_3d: false,
        variants: &[],
        default_variant: None,
        build: bbbc008,
    },
    DatasetInfo {
        id: "BBBC010",
        title: "C. elegans live/dead assay",
        is_3d: false,
        variants: &[],
        default_variant: None,
        build: bbbc010,
    },
    DatasetInfo {
        id: "BBBC027",
        title: "3D synthetic colon tissue with varying SNR",
        is_3d: true,
        variants: &["low", "high"],
        default_variant: Some("high"),
        build: bbbc027,
    },
    DatasetInfo {
        id: "BBBC028",
        title: "Polymerized structures in DIC microscopy",
        is_3d: false,
        variants: &[],
        default_variant: None,
        build: bbbc028,
    },
    DatasetInfo {
        id: "BBBC029",
        title: "Synthetic DIC images",
        is_3d: false,
        variants: &[],
        default_variant: None,
        build: bbbc029,
    },
    DatasetInfo {
        id: "BBBC033",
        title: "3D mouse trophoblast stem cells",
        is_3d: true,
        variants: &[],
        default_variant: None,
        build: bbbc033,
    },
    DatasetInfo {
        id: "BBBC038",
        title: "Kaggle 2018 Data Science Bowl nuclei",
        is_3d: false,
        variants: &["stage1_train", "stage1_test", "stage2_test_final"],
        default_variant: Some("stage1_train"),
        build: bbbc038,
    },
    DatasetInfo {
        id: "BBBC039",
        title: "Nuclei of U2OS cells in a chemical screen",
        is_3d: false,
        variants: &[],
        default_variant: None,
        build: bbbc039,
    },
    DatasetInfo {
        id: "BBBC046",
        title: "FiloData3D synthetic time-lapse of A549 cells with filopodia",
        is_3d: true,
        variants: &[
            "OE-ID350", "OE-ID351", "OE-ID352", "PD-ID450", "PD-ID451", "PD-ID452", "WT-ID550",
            "WT-ID551", "WT-ID552",
        ],
        default_variant: Some("WT-ID550"),
        build: bbbc046,
    },
];

/// Every catalogued dataset, in id order.
pub fn all() -> &'static [DatasetInfo] {
    DATASETS
}

/// Look up a dataset by id (case-insensitive).
pub fn find(id: &str) -> Result<&'static DatasetInfo> {
    DATASETS
        .iter()
        .find(|info| info.id.eq_ignore_ascii_case(id))
        .ok_or_else(|| {
            BbbcError::config(format!(
                "Unknown dataset {:?}. Choose from {:?}",
                id,
                DATASETS.iter().map(|info| info.id).collect::<Vec<_>>()
            ))
        })
}

/// Datasets matching a dimensionality filter; `None` keeps everything.
pub fn filter(is_3d: Option<bool>) -> Vec<&'static DatasetInfo> {
    DATASETS
        .iter()
        .filter(|info| is_3d.map_or(true, |wanted| info.is_3d == wanted))
        .collect()
}
