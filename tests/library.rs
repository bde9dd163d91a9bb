use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Result;
use schemaview::{
    AppState, Command, SchemaBase, SchemaLoader, SchemaModel, SearchKind, Sidebar, UmsType,
    UrlState, ViewSettings, render_svg, search,
};

fn schema_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("schemas")
}

fn bundled(schema: &str) -> Result<SchemaModel> {
    let path = schema_dir().join(format!("{schema}.schema.json"));
    let document = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    Ok(SchemaModel::parse(&document, schema)?)
}

fn document_state(settings: ViewSettings) -> Result<AppState> {
    Ok(AppState::new(bundled("Document")?, settings))
}

#[test]
fn bundled_schemas_parse_into_consistent_models() -> Result<()> {
    for schema in ["Document", "Configuration"] {
        let model = bundled(schema)?;
        let ids: HashSet<&str> = model.order.iter().map(String::as_str).collect();
        assert_eq!(ids.len(), model.order.len(), "node ids should be unique");
        assert_eq!(model.root_id(), schema);

        for node in model.iter() {
            for relation in &node.relations {
                assert!(
                    model.contains(&relation.target),
                    "{}.{} points at missing {}",
                    node.id,
                    relation.property,
                    relation.target
                );
            }
        }
    }
    Ok(())
}

#[test]
fn ums_types_follow_schema_hints() -> Result<()> {
    let model = bundled("Document")?;
    let ums = |id: &str| model.get(id).map(|node| node.ums_type.clone());
    assert_eq!(ums("Document"), Some(UmsType::Root));
    assert_eq!(ums("PackageLink"), Some(UmsType::Subentity));
    assert_eq!(ums("ExternalVendorReference"), Some(UmsType::ExternalOwnership));
    assert_eq!(ums("Tombstone"), Some(UmsType::Ephemeral));
    Ok(())
}

#[test]
fn initial_depth_controls_the_displayed_set() -> Result<()> {
    let state = document_state(ViewSettings {
        depth: 0,
        ..ViewSettings::default()
    })?;
    assert_eq!(state.displayed.nodes(), ["Document"]);
    assert!(state.displayed.links().is_empty());

    let state = document_state(ViewSettings::default())?;
    let root = state.model.get("Document").expect("root node");
    let targets: HashSet<&str> = root.relations.iter().map(|r| r.target.as_str()).collect();
    assert_eq!(state.displayed.nodes().len(), targets.len() + 1);
    assert_eq!(state.displayed.links().len(), root.relations.len());
    Ok(())
}

#[test]
fn self_reference_is_one_arc() -> Result<()> {
    let mut state = document_state(ViewSettings::default())?;
    state.dispatch(Command::ExpandNeighbors {
        id: "Package".into(),
    });
    state.dispatch(Command::ExpandNeighbors {
        id: "Package".into(),
    });

    let loops: Vec<_> = state
        .displayed
        .links()
        .iter()
        .filter(|link| link.is_self_loop())
        .filter(|link| link.source == "Package")
        .collect();
    assert_eq!(loops.len(), 1);
    assert_eq!(loops[0].id, "Package-Package-supersededBy");

    let svg = render_svg(&state, "white")?;
    assert!(svg.contains("data-link=\"Package-Package-supersededBy\" d=\"M"));
    Ok(())
}

#[test]
fn search_ranks_shorter_entities_first() -> Result<()> {
    let model = bundled("Document")?;
    let results = search(&model, "pack");
    let entities: Vec<&str> = results
        .iter()
        .filter(|result| result.kind == SearchKind::Entity)
        .map(|result| result.name.as_str())
        .collect();
    assert_eq!(entities, ["Package", "PackageLink"]);
    assert!(search(&model, "p").is_empty());
    Ok(())
}

#[test]
fn url_state_restores_view() -> Result<()> {
    let mut state = document_state(ViewSettings::default())?;
    state.dispatch(Command::ShowRelation {
        source: "ApiResource".into(),
        target: "Package".into(),
        property: "partOfPackage".into(),
    });
    let query = state.url_state().to_query();
    assert!(query.contains("link=ApiResource-Package-partOfPackage"));

    let mut restored = document_state(ViewSettings::default())?;
    restored.apply_url_state(&UrlState::parse(&query));
    assert_eq!(restored.selected_link(), Some("ApiResource-Package-partOfPackage"));
    Ok(())
}

#[test]
fn sidebar_links_descriptions_to_nodes() -> Result<()> {
    let mut state = document_state(ViewSettings::default())?;
    state.dispatch(Command::SelectNode {
        id: "Package".into(),
    });
    let html = Sidebar::new().render(&state)?;
    assert!(html.contains("class=\"node-link\""));
    assert!(html.contains("&quot;type&quot;:&quot;revealNode&quot;,&quot;id&quot;:&quot;Vendor&quot;"));
    assert!(html.contains("data-property=\"ordId\""));
    Ok(())
}

#[cfg(feature = "png")]
#[test]
fn render_png_has_png_header() -> Result<()> {
    let state = document_state(ViewSettings::default())?;
    let svg = render_svg(&state, "white")?;
    let png = schemaview::render_png(&svg, 1.0)?;

    const PNG_MAGIC: &[u8; 8] = b"\x89PNG\r\n\x1a\n";
    assert!(
        png.starts_with(PNG_MAGIC),
        "rendered png should start with PNG header"
    );
    Ok(())
}

#[tokio::test]
async fn loader_feeds_the_ticketed_load_path() -> Result<()> {
    let loader = SchemaLoader::new(SchemaBase::Directory(schema_dir()));
    let mut state = AppState::placeholder(ViewSettings::default());

    let ticket = state.begin_load("Configuration");
    let result = loader.fetch("Configuration").await;
    assert!(state.finish_load(ticket, result));
    assert!(state.load_error.is_none());
    assert_eq!(state.schema_name(), "Configuration");
    assert!(state.displayed.contains_node("OpenResourceDiscoveryV1"));
    Ok(())
}
