use tracing::warn;

/// Content-delivery cache regions known to the host framework
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheRegion {
    Unknown,
    BinaryMeta,
    Taxonomy,
    TaxonomyMeta,
    TaxonomyKeywordCount,
    TaxonomyKeywordRelations,
    Category,
    ComponentLink,
    ComponentMeta,
    ItemMeta,
    ComponentPresentation,
    Schema,
    ReferenceEntry,
    ComponentPresentationMeta,
    CustomerCharacteristic,
    PageLink,
    PageMeta,
    TimeFrame,
    TrackedComponent,
    TrackedComponentLink,
    TrackedPage,
    TrackingKey,
    User,
    Xslt,
    QueryPlan,
    QueryResult,
    BinaryContent,
    ComponentLinkClick,
    ComponentVisit,
    PageLinkInfo,
    ComponentLinkInfo,
    Transformer,
    TransformerResults,
    ComponentMetaQuery,
    Publication,
}

const REGION_PATHS: &[(CacheRegion, &str)] = &[
    (CacheRegion::BinaryMeta, "/com.tridion.broker.binaries.meta.BinaryMeta"),
    (CacheRegion::Taxonomy, "/com.tridion.broker.Taxonomies.Taxonomy"),
    (CacheRegion::TaxonomyMeta, "/com.tridion.broker.Taxonomies.Meta"),
    (CacheRegion::TaxonomyKeywordCount, "/com.tridion.broker.Taxonomy.KeywordCount"),
    (CacheRegion::TaxonomyKeywordRelations, "/com.tridion.broker.Taxonomy.KeywordRelations"),
    (CacheRegion::Category, "/com.tridion.broker.meta.categorization.Category"),
    (CacheRegion::ComponentLink, "/com.tridion.linking.ComponentLink"),
    (CacheRegion::ComponentMeta, "/com.tridion.broker.components.meta.ComponentMeta"),
    (CacheRegion::ItemMeta, "/com.tridion.storage.ItemMeta"),
    (CacheRegion::ComponentPresentation, "/com.tridion.storage.ComponentPresentation"),
    (CacheRegion::Schema, "/com.tridion.storage.Schema"),
    (CacheRegion::ReferenceEntry, "/com.tridion.storage.ReferenceEntry"),
    (
        CacheRegion::ComponentPresentationMeta,
        "/com.tridion.broker.componentpresentations.meta.ComponentPresentationMeta",
    ),
    (CacheRegion::CustomerCharacteristic, "/com.tridion.personalization.CustomerCharacteristic"),
    (CacheRegion::PageLink, "/com.tridion.linking.PageLink"),
    (CacheRegion::PageMeta, "/com.tridion.broker.pages.meta.PageMeta"),
    (CacheRegion::TimeFrame, "/com.tridion.timeframes.Timeframe"),
    (CacheRegion::TrackedComponent, "/com.tridion.tracking.components.TrackedComponent"),
    (
        CacheRegion::TrackedComponentLink,
        "/com.tridion.tracking.componentlinks.TrackedComponentLink",
    ),
    (CacheRegion::TrackedPage, "/com.tridion.tracking.pages.TrackedPage"),
    (CacheRegion::TrackingKey, "/com.tridion.personalization.TrackingKey"),
    (CacheRegion::User, "/com.tridion.user.User"),
    (CacheRegion::Xslt, "/com.tridion.storage.XSLT"),
    (CacheRegion::QueryPlan, "/com.tridion.storage.QueryPlan"),
    (CacheRegion::QueryResult, "/com.tridion.storage.QueryResult"),
    (CacheRegion::BinaryContent, "/com.tridion.storage.BinaryContent"),
    (CacheRegion::ComponentLinkClick, "/com.tridion.storage.ComponentLinkClick"),
    (CacheRegion::ComponentVisit, "/com.tridion.storage.ComponentVisit"),
    (CacheRegion::PageLinkInfo, "/com_tridion_linking_PageLinkInfo"),
    (CacheRegion::ComponentLinkInfo, "/com_tridion_linking_ComponentLinkInfo"),
    (CacheRegion::Transformer, "/com_tridion_Transformer"),
    (CacheRegion::TransformerResults, "/com_tridion_TransformerResults"),
    (
        CacheRegion::ComponentMetaQuery,
        "/com_tridion_broker_components_meta_componentmeta_QueryResults",
    ),
    (CacheRegion::Publication, "/com.tridion.storage.publication"),
];

impl CacheRegion {
    /// Case-insensitive lookup of a region path; unknown paths are logged
    /// and map to [`CacheRegion::Unknown`].
    pub fn from_path(path: &str) -> CacheRegion {
        if let Some((region, _)) = REGION_PATHS
            .iter()
            .find(|(_, candidate)| candidate.eq_ignore_ascii_case(path))
        {
            return *region;
        }

        warn!(region_path = %path, "Unknown CacheRegion encountered");
        CacheRegion::Unknown
    }

    /// Canonical region path, `None` for [`CacheRegion::Unknown`]
    pub fn path(self) -> Option<&'static str> {
        REGION_PATHS
            .iter()
            .find(|(region, _)| *region == self)
            .map(|(_, path)| *path)
    }

    pub fn all() -> impl Iterator<Item = CacheRegion> {
        REGION_PATHS.iter().map(|(region, _)| *region)
    }
}
