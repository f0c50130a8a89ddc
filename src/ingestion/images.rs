use crate::listen_store::ImageUrls;
use crate::spotify::ImageObject;

/// Picks small/medium/large URLs from the image variants of an entity.
///
/// Variants are ordered by ascending height (missing height counts as 0):
/// - none: all absent
/// - one: that url everywhere
/// - two: small is the first, medium and large are the second
/// - three or more: first, second and last
pub fn select_images(images: &[ImageObject]) -> ImageUrls {
    let mut sorted: Vec<&ImageObject> = images.iter().collect();
    sorted.sort_by_key(|img| img.height.unwrap_or(0));

    let (Some(first), Some(last)) = (sorted.first(), sorted.last()) else {
        return ImageUrls::default();
    };
    let medium = match sorted.len() {
        1 => first,
        2 => last,
        _ => sorted[1],
    };
    ImageUrls {
        small: Some(first.url.clone()),
        medium: Some(medium.url.clone()),
        large: Some(last.url.clone()),
    }
}
