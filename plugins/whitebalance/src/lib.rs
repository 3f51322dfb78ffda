//! Loadable wrapper exporting the white balance plugin's factory symbol.

rawtile_plugin::export_plugin!(rawtile_plugins::WhiteBalancePlugin);
