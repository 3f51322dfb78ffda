//! Loadable wrapper exporting the gamma plugin's factory symbol.

rawtile_plugin::export_plugin!(rawtile_plugins::GammaPlugin);
