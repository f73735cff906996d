//! Role declarations for channels and news items.
//!
//! A role's index is its position in the concatenated role list of the
//! schema it belongs to. The standard news roles always come first, so site
//! extensions append after [`news::STANDARD`] without disturbing the indices
//! generic code relies on.

use super::{Role, RoleKind, Schema};
use once_cell::sync::Lazy;

/// Standard roles of a news item.
pub mod news {
    use super::{Role, RoleKind};

    pub const TITLE: Role = Role::new(0, "title", RoleKind::Text);
    pub const LINK: Role = Role::new(1, "link", RoleKind::Url);
    pub const DESCRIPTION: Role = Role::new(2, "description", RoleKind::Text);
    pub const AUTHOR_EMAIL: Role = Role::new(3, "authorEMail", RoleKind::Text);
    pub const CATEGORIES: Role = Role::new(4, "categories", RoleKind::TextList);
    pub const ENCLOSURE_URL: Role = Role::new(5, "enclosureUrl", RoleKind::Url);
    pub const ENCLOSURE_LENGTH: Role = Role::new(6, "enclosureLength", RoleKind::UInt);
    pub const ENCLOSURE_TYPE: Role = Role::new(7, "enclosureType", RoleKind::Text);
    pub const PERMALINK: Role = Role::new(8, "permalink", RoleKind::Url);
    pub const PUB_DATE: Role = Role::new(9, "pubDate", RoleKind::DateTime);
    pub const CREATOR: Role = Role::new(10, "creator", RoleKind::Text);
    pub const QML_ITEM: Role = Role::new(11, "qmlItem", RoleKind::Url);
    pub const ATTACHED_FILES: Role = Role::new(12, "attachedFiles", RoleKind::TextList);
    pub const COMPLETE: Role = Role::new(13, "complete", RoleKind::Bool);

    pub const STANDARD: &[Role] = &[
        TITLE,
        LINK,
        DESCRIPTION,
        AUTHOR_EMAIL,
        CATEGORIES,
        ENCLOSURE_URL,
        ENCLOSURE_LENGTH,
        ENCLOSURE_TYPE,
        PERMALINK,
        PUB_DATE,
        CREATOR,
        QML_ITEM,
        ATTACHED_FILES,
        COMPLETE,
    ];

    /// Display template assigned to items that do not choose their own.
    pub const DEFAULT_DISPLAY_TEMPLATE: &str = "qrc:///qml/NewsDisplay.qml";
}

/// Extra item roles filled in by the www.ilribelle.com completer.
pub mod ilribelle {
    use super::{Role, RoleKind};

    pub const MAIN_IMAGE_URL: Role = Role::new(14, "mainImageUrl", RoleKind::Url);
    pub const MAIN_IMAGE_FILE: Role = Role::new(15, "mainImageFile", RoleKind::Text);
    pub const HAS_AUDIO_RESOURCE: Role = Role::new(16, "hasAudioResource", RoleKind::Bool);
    pub const AUDIO_RESOURCE_URL: Role = Role::new(17, "audioResourceUrl", RoleKind::Url);
    pub const AUDIO_RESOURCE_PATH: Role = Role::new(18, "audioResourcePath", RoleKind::Text);
    pub const AUDIO_RESOURCE_TITLE: Role = Role::new(19, "audioResourceTitle", RoleKind::Text);
    pub const AUDIO_RESOURCE_AUTHOR: Role = Role::new(20, "audioResourceAuthor", RoleKind::Text);
    pub const AUDIO_RESOURCE_DURATION: Role =
        Role::new(21, "audioResourceDuration", RoleKind::UInt);
    pub const HAS_LIVESTREAM_LINK: Role = Role::new(22, "hasLivestreamLink", RoleKind::Bool);
    pub const LIVESTREAM_URL: Role = Role::new(23, "livestreamUrl", RoleKind::Url);
    pub const IFRAME_URLS: Role = Role::new(24, "iframeUrls", RoleKind::TextList);

    pub const EXTENSION: &[Role] = &[
        MAIN_IMAGE_URL,
        MAIN_IMAGE_FILE,
        HAS_AUDIO_RESOURCE,
        AUDIO_RESOURCE_URL,
        AUDIO_RESOURCE_PATH,
        AUDIO_RESOURCE_TITLE,
        AUDIO_RESOURCE_AUTHOR,
        AUDIO_RESOURCE_DURATION,
        HAS_LIVESTREAM_LINK,
        LIVESTREAM_URL,
        IFRAME_URLS,
    ];

    pub const DISPLAY_TEMPLATE: &str = "qrc:///qml/DisplayIlRibelle.qml";
}

/// Standard roles of a channel.
pub mod channel {
    use super::{Role, RoleKind};

    pub const SITE_URL: Role = Role::new(0, "siteUrl", RoleKind::Url);
    pub const TITLE: Role = Role::new(1, "title", RoleKind::Text);
    pub const LINK: Role = Role::new(2, "link", RoleKind::Url);
    pub const DESCRIPTION: Role = Role::new(3, "description", RoleKind::Text);
    pub const LANGUAGE: Role = Role::new(4, "language", RoleKind::Text);
    pub const COPYRIGHT: Role = Role::new(5, "copyright", RoleKind::Text);
    pub const MANAGING_EDITOR: Role = Role::new(6, "managingEditor", RoleKind::Text);
    pub const WEB_MASTER: Role = Role::new(7, "webMaster", RoleKind::Text);
    pub const PUB_DATE: Role = Role::new(8, "pubDate", RoleKind::DateTime);
    pub const LAST_BUILD_DATE: Role = Role::new(9, "lastBuildDate", RoleKind::DateTime);
    pub const CATEGORIES: Role = Role::new(10, "categories", RoleKind::TextList);
    pub const TTL: Role = Role::new(11, "ttl", RoleKind::UInt);
    pub const IMAGE_URL: Role = Role::new(12, "imageUrl", RoleKind::Url);
    pub const IMAGE_DESCRIPTION: Role = Role::new(13, "imageDescription", RoleKind::Text);
    pub const ATTACHED_FILES: Role = Role::new(14, "attachedFiles", RoleKind::TextList);

    pub const STANDARD: &[Role] = &[
        SITE_URL,
        TITLE,
        LINK,
        DESCRIPTION,
        LANGUAGE,
        COPYRIGHT,
        MANAGING_EDITOR,
        WEB_MASTER,
        PUB_DATE,
        LAST_BUILD_DATE,
        CATEGORIES,
        TTL,
        IMAGE_URL,
        IMAGE_DESCRIPTION,
        ATTACHED_FILES,
    ];
}

/// Schema of a plain news item.
pub static NEWS_SCHEMA: Lazy<Schema> = Lazy::new(|| Schema::new(&[news::STANDARD]));

/// Schema of a www.ilribelle.com news item: the standard roles plus the site extension.
pub static ILRIBELLE_NEWS_SCHEMA: Lazy<Schema> =
    Lazy::new(|| Schema::new(&[news::STANDARD, ilribelle::EXTENSION]));

pub static CHANNEL_SCHEMA: Lazy<Schema> = Lazy::new(|| Schema::new(&[channel::STANDARD]));
