//! Loadable wrapper exporting the denoise plugin's factory symbol.

rawtile_plugin::export_plugin!(rawtile_plugins::DenoisePlugin);
