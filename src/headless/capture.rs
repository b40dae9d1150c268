use log::trace;

use crate::errors::Result;
use crate::resources::{ColorImage, ImageLayout};

/// Copies the rendered color target into the color history slot.
///
/// ```text
///   history:  general ─▶ transfer-dst ─▶ (copy) ─▶ general
///   target:   color-attachment ─▶ transfer-src ─▶ (copy) ─▶ color-attachment
/// ```
///
/// Both images end in the layout they started in, so the classifier can
/// keep reading the history slot as a storage image.
pub fn capture_color(target: &mut ColorImage, history: &mut ColorImage) -> Result<()> {
    history.transition(ImageLayout::General, ImageLayout::TransferDst)?;
    target.transition(ImageLayout::ColorAttachment, ImageLayout::TransferSrc)?;

    history.copy_from(target)?;

    history.transition(ImageLayout::TransferDst, ImageLayout::General)?;
    target.transition(ImageLayout::TransferSrc, ImageLayout::ColorAttachment)?;
    trace!(
        "Captured {}x{} color into history",
        target.extent().width,
        target.extent().height
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::Extent;

    #[test]
    fn capture_restores_layouts_and_copies() {
        let extent = Extent::new(4, 2);
        let mut target =
            ColorImage::new("target", extent, [9, 8, 7, 255], ImageLayout::ColorAttachment).unwrap();
        let mut history = ColorImage::new("history", extent, [0; 4], ImageLayout::General).unwrap();

        capture_color(&mut target, &mut history).unwrap();

        assert_eq!(target.layout(), ImageLayout::ColorAttachment);
        assert_eq!(history.layout(), ImageLayout::General);
        assert!(history.texels().iter().all(|t| *t == [9, 8, 7, 255]));
    }

    #[test]
    fn capture_rejects_history_in_wrong_layout() {
        let extent = Extent::new(2, 2);
        let mut target =
            ColorImage::new("target", extent, [0; 4], ImageLayout::ColorAttachment).unwrap();
        let mut history =
            ColorImage::new("history", extent, [0; 4], ImageLayout::ShaderRead).unwrap();
        assert!(capture_color(&mut target, &mut history).is_err());
    }
}
