//! Notebook image provisioning.
//!
//! Two image families exist. Built-in studio images are owned by the
//! platform vendor in fixed per-region accounts; we only compute their
//! ARNs. Custom kernel images come from the deployment account's own
//! container registry and synthesize into image, image-version, and
//! app-image-config documents per declared tag.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use tracing::debug;

use studioforge_config::ImageConfig;

use crate::error::{Result, SynthError};
use crate::resource::Resource;
use crate::SynthContext;

/// Default studio UI image attached to every user profile.
const STUDIO_IMAGE_NAME: &str = "jupyter-server-3";
const STUDIO_IMAGE_INSTANCE: &str = "system";

/// Built-in kernel image used when a domain declares no custom images.
const DEFAULT_KERNEL_IMAGE_NAME: &str = "datascience-1.0";
pub const DEFAULT_KERNEL_INSTANCE: &str = "ml.t3.medium";

/// Kernel name registered inside custom images.
const CUSTOM_KERNEL_NAME: &str = "python3";

/// Vendor accounts hosting the built-in studio images, per region.
static IMAGE_REGION_ACCOUNTS: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        ("us-east-1", "081325390199"),
        ("us-east-2", "429704687514"),
        ("us-west-1", "742091327244"),
        ("us-west-2", "236514542706"),
        ("af-south-1", "559312083959"),
        ("ap-east-1", "493642496378"),
        ("ap-south-1", "394103062818"),
        ("ap-northeast-2", "806072073708"),
        ("ap-southeast-1", "492261229750"),
        ("ap-southeast-2", "452832661640"),
        ("ap-northeast-1", "102112518831"),
        ("ca-central-1", "310906938811"),
        ("eu-central-1", "936697816551"),
        ("eu-west-1", "470317259841"),
        ("eu-west-2", "712779665605"),
        ("eu-west-3", "615547856133"),
        ("eu-north-1", "243637512696"),
        ("eu-south-1", "592751261982"),
        ("sa-east-1", "782484402741"),
    ])
});

fn image_account(region: &str) -> Result<&'static str> {
    IMAGE_REGION_ACCOUNTS
        .get(region)
        .copied()
        .ok_or_else(|| SynthError::UnsupportedRegion {
            region: region.to_string(),
        })
}

fn builtin_image_arn(region: &str, name: &str) -> Result<String> {
    let account = image_account(region)?;
    Ok(format!("arn:aws:sagemaker:{region}:{account}:image/{name}"))
}

/// ARN of the studio UI image for the region, paired with the `system`
/// pseudo instance type.
pub fn default_studio_image(region: &str) -> Result<(String, &'static str)> {
    Ok((builtin_image_arn(region, STUDIO_IMAGE_NAME)?, STUDIO_IMAGE_INSTANCE))
}

/// ARN of the fallback kernel image for the region.
pub fn default_kernel_image_arn(region: &str) -> Result<String> {
    builtin_image_arn(region, DEFAULT_KERNEL_IMAGE_NAME)
}

/// One synthesized custom image, addressable by tag from domain config.
#[derive(Debug, Clone)]
pub struct CustomImageHandle {
    pub image_name: String,
    pub image_ref: String,
    pub app_image_config_ref: String,
}

#[derive(Debug, Default)]
pub struct ProvisionedImages {
    /// Tag to image handle. A tag declared by more than one repository
    /// resolves to the last declaration.
    pub by_tag: BTreeMap<String, CustomImageHandle>,
    pub resources: Vec<Resource>,
}

impl ProvisionedImages {
    pub fn get(&self, tag: &str) -> Option<&CustomImageHandle> {
        self.by_tag.get(tag)
    }
}

/// Synthesize image, image-version, and app-image-config documents for
/// every declared repository tag. `role_ref` is the role the notebook
/// service assumes to pull from the registry.
pub fn provision_images(
    ctx: &SynthContext,
    images: &[ImageConfig],
    role_ref: &str,
) -> ProvisionedImages {
    let mut out = ProvisionedImages::default();
    for image in images {
        for tag in &image.tags {
            let image_name = format!("{}-{}", image.repository_name, tag);
            let image_ref = format!("{image_name}-image");
            let version_ref = format!("{image_name}-version");
            let config_ref = format!("{image_name}-config");
            let base_image = format!(
                "{}.dkr.ecr.{}.amazonaws.com/{}:{}",
                ctx.account_id, ctx.region, image.repository_name, tag
            );
            debug!(image = %image_name, uri = %base_image, "synthesizing custom image");

            out.resources.push(Resource::Image {
                id: image_ref.clone(),
                image_name: image_name.clone(),
                role_ref: role_ref.to_string(),
            });
            out.resources.push(Resource::ImageVersion {
                id: version_ref,
                image_ref: image_ref.clone(),
                base_image,
            });
            out.resources.push(Resource::AppImageConfig {
                id: config_ref.clone(),
                config_name: config_ref.clone(),
                kernel_name: CUSTOM_KERNEL_NAME.to_string(),
            });

            out.by_tag.insert(
                tag.clone(),
                CustomImageHandle {
                    image_name,
                    image_ref,
                    app_image_config_ref: config_ref,
                },
            );
        }
    }
    out
}
